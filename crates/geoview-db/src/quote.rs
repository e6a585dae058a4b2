//! SQL identifier quoting for dynamically discovered names.

/// Double-quote an identifier, escaping embedded quotes.
///
/// Table and column names here come out of `information_schema` (or out of
/// the namer, which only emits `[a-z0-9_]`), but they are still always
/// quoted before interpolation so case and special characters survive.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_identifier() {
        assert_eq!(quote_ident("roads"), "\"roads\"");
    }

    #[test]
    fn test_preserves_case_and_spaces() {
        assert_eq!(quote_ident("Street Name"), "\"Street Name\"");
    }

    #[test]
    fn test_escapes_embedded_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
