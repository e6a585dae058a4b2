//! Request-level limits for the read endpoints.

/// Default rows returned by the attribute grid endpoint.
pub const DEFAULT_GRID_ROWS: i64 = 50;

/// Hard ceiling on rows any grid request can ask for.
pub const MAX_GRID_ROWS: i64 = 1000;

/// Features returned per GeoJSON request.
pub const GEOJSON_FEATURE_LIMIT: i64 = 1000;
