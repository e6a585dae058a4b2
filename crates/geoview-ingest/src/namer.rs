//! Table name derivation.
//!
//! Names are derived from the caller's preferred name or the archive's
//! filename, reduced to `[a-z0-9_]`, prefixed when they would start with
//! a digit, and probed against a snapshot of existing tables for a free
//! `_N` suffix. The snapshot is taken once per upload; a concurrent
//! upload racing for the same name loses at CREATE TABLE time instead.

use std::collections::HashSet;

use uuid::Uuid;

/// Derive a collision-free table name.
///
/// `preferred` wins when present and non-blank; otherwise the base is the
/// archive filename without its extension.
pub fn derive_table_name(
    preferred: Option<&str>,
    original_filename: &str,
    existing: &HashSet<String>,
) -> String {
    let base = preferred
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| filename_stem(original_filename));

    let mut name = sanitize(&base);
    if name.is_empty() {
        name = format!("layer_{}", Uuid::new_v4().simple());
    }

    if !existing.contains(&name) {
        return name;
    }
    let mut suffix = 1u32;
    loop {
        let candidate = format!("{}_{}", name, suffix);
        if !existing.contains(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

fn filename_stem(filename: &str) -> String {
    std::path::Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("")
        .to_string()
}

/// Lowercase, map everything outside `[a-z0-9]` to `_`, trim the
/// underscores that mapping leaves at the edges, and prefix names that
/// would start with a digit so they stay valid unquoted identifiers.
fn sanitize(base: &str) -> String {
    let mapped: String = base
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let trimmed = mapped.trim_matches('_');

    match trimmed.chars().next() {
        None => String::new(),
        Some(first) if first.is_ascii_digit() => format!("table_{}", trimmed),
        Some(_) => trimmed.to_string(),
    }
}
