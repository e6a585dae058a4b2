//! Database access layer: schema introspection over `information_schema`,
//! GeoJSON assembly, and keyword search.
//!
//! Every table this application serves was created at runtime by the
//! ingestion pipeline, so there is no static schema: repositories discover
//! tables and columns per request and validate requested names against the
//! catalog before interpolating them (quoted) into SQL. Row values always
//! go through bind parameters.

mod features;
mod quote;
mod schema;
mod search;

pub use features::{Bounds, FeatureRepository, TableGrid};
pub use quote::quote_ident;
pub use schema::{find_geometry_column, ColumnInfo, SchemaRepository, TableSummary};
pub use search::{SearchRepository, SearchResult};
