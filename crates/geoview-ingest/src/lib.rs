//! Shapefile ingestion pipeline.
//!
//! An uploaded ZIP archive moves through six stages: staging to scratch
//! disk, locating the shapefile inside the archive, deriving a collision
//! free table name, normalizing coordinates to the configured SRID, bulk
//! writing a spatial table, and reporting the result. Each stage is its
//! own module; [`pipeline::ShapefileIngestor`] wires them together.

pub mod crs;
pub mod error;
pub mod locate;
pub mod namer;
pub mod pipeline;
pub mod reader;
pub mod stage;
pub mod writer;

pub use crs::CrsNormalizer;
pub use error::IngestError;
pub use pipeline::{IngestReport, ShapefileIngestor};
pub use writer::SpatialTableWriter;
