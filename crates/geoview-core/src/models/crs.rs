//! Coordinate reference system identification.
//!
//! A shapefile declares its CRS through the `.prj` sidecar, which holds an
//! ESRI WKT definition. We only need to answer two questions about it: is
//! it WGS84 already, and if not, which EPSG code does it resolve to so the
//! normalizer can build a transform. Anything we cannot resolve keeps its
//! raw WKT for logging and is treated as unresolvable downstream.

use serde::Serialize;

pub const WGS84_EPSG: u32 = 4326;

/// A coordinate reference system as declared by an imported dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Crs {
    /// Resolved EPSG code, when the definition names one we recognize.
    pub epsg: Option<u32>,
    /// Raw WKT definition from the `.prj` sidecar, when one was present.
    pub wkt: Option<String>,
}

/// Well-known geographic/projected system names that appear in `.prj`
/// files without an AUTHORITY tag.
const NAMED_SYSTEMS: &[(&str, u32)] = &[
    ("GCS_WGS_1984", 4326),
    ("WGS 84", 4326),
    ("WGS_1984_Web_Mercator_Auxiliary_Sphere", 3857),
    ("WGS 84 / Pseudo-Mercator", 3857),
];

impl Crs {
    pub fn epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            wkt: None,
        }
    }

    pub fn wgs84() -> Self {
        Self::epsg(WGS84_EPSG)
    }

    /// Parse a `.prj` sidecar's ESRI WKT definition.
    ///
    /// Resolution order: the outermost AUTHORITY["EPSG","…"] tag (the last
    /// one in the text belongs to the top-level object), then a short table
    /// of well-known system names.
    pub fn from_prj_wkt(wkt: &str) -> Self {
        let trimmed = wkt.trim();
        let epsg = last_epsg_authority(trimmed).or_else(|| {
            NAMED_SYSTEMS
                .iter()
                .find(|(name, _)| trimmed.contains(name))
                .map(|(_, code)| *code)
        });
        Self {
            epsg,
            wkt: Some(trimmed.to_string()),
        }
    }

    pub fn is_wgs84(&self) -> bool {
        self.epsg == Some(WGS84_EPSG)
    }

    /// Human-readable identifier, e.g. `EPSG:4326`.
    pub fn display_name(&self) -> Option<String> {
        self.epsg.map(|code| format!("EPSG:{}", code))
    }
}

/// Find the EPSG code of the last AUTHORITY tag in a WKT definition.
/// Nested objects (datum, spheroid, units) carry their own AUTHORITY tags;
/// the top-level object's tag comes last in well-formed output.
fn last_epsg_authority(wkt: &str) -> Option<u32> {
    let upper = wkt.to_uppercase();
    let mut result = None;
    let mut search_from = 0;
    while let Some(pos) = upper[search_from..].find("AUTHORITY") {
        let abs = search_from + pos;
        let rest = &upper[abs..];
        if let Some(code) = parse_authority_code(rest) {
            result = Some(code);
        }
        search_from = abs + "AUTHORITY".len();
    }
    result
}

/// Parse `AUTHORITY["EPSG","4326"]` starting at the AUTHORITY keyword.
fn parse_authority_code(s: &str) -> Option<u32> {
    let open = s.find('[')?;
    let close = s[open..].find(']')? + open;
    let inner = &s[open + 1..close];
    let mut parts = inner.split(',');
    let agency = parts.next()?.trim().trim_matches('"');
    if agency != "EPSG" {
        return None;
    }
    let code = parts.next()?.trim().trim_matches('"');
    code.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

    const UTM33N_PRJ: &str = r#"PROJCS["WGS 84 / UTM zone 33N",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]],PROJECTION["Transverse_Mercator"],PARAMETER["latitude_of_origin",0],PARAMETER["central_meridian",15],PARAMETER["scale_factor",0.9996],PARAMETER["false_easting",500000],PARAMETER["false_northing",0],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AUTHORITY["EPSG","32633"]]"#;

    #[test]
    fn test_authority_tag_wins_over_nested_tags() {
        let crs = Crs::from_prj_wkt(UTM33N_PRJ);
        assert_eq!(crs.epsg, Some(32633));
        assert!(!crs.is_wgs84());
    }

    #[test]
    fn test_named_system_without_authority() {
        let crs = Crs::from_prj_wkt(WGS84_PRJ);
        assert_eq!(crs.epsg, Some(4326));
        assert!(crs.is_wgs84());
    }

    #[test]
    fn test_unknown_definition_keeps_wkt() {
        let crs = Crs::from_prj_wkt(r#"PROJCS["Local_Grid",GEOGCS["Custom"]]"#);
        assert_eq!(crs.epsg, None);
        assert!(crs.wkt.as_deref().unwrap().contains("Local_Grid"));
        assert_eq!(crs.display_name(), None);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(Crs::wgs84().display_name().as_deref(), Some("EPSG:4326"));
    }
}
