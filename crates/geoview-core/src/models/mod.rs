//! Shared domain models.

mod crs;
mod feature_set;

pub use crs::Crs;
pub use feature_set::{AttrKind, AttrValue, ColumnSpec, FeatureRow, FeatureSet};
