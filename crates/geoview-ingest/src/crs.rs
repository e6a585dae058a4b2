//! Coordinate normalization to the configured target SRID.
//!
//! Reprojection degrades instead of failing: a dataset whose CRS cannot
//! be resolved or transformed is imported with its coordinates untouched
//! and a warning logged, because a misprojected layer the user can see
//! beats a rejected upload. The writer tags the target SRID either way.

use geo::MapCoords;
use geo_types::{Coord, Geometry};
use geoview_core::models::{Crs, FeatureSet};
use proj4rs::Proj;

use crate::error::IngestError;

/// Normalizes feature geometry into the target EPSG system.
pub struct CrsNormalizer {
    target_epsg: u32,
}

impl CrsNormalizer {
    pub fn new(target_epsg: u32) -> Self {
        Self { target_epsg }
    }

    /// Bring `feature_set` into the target CRS where possible.
    ///
    /// Undeclared CRS: assume the target and warn. Declared and equal to
    /// the target: no-op. Declared, resolvable, different: reproject
    /// every coordinate. Unresolvable or failing transform: keep the
    /// coordinates as-is and warn.
    pub fn normalize(&self, feature_set: &mut FeatureSet) -> Result<(), IngestError> {
        match feature_set.crs.clone() {
            None => {
                tracing::warn!(
                    assumed = %format!("EPSG:{}", self.target_epsg),
                    "No CRS declared by the shapefile; assuming the target system"
                );
                feature_set.crs = Some(Crs::epsg(self.target_epsg));
            }
            Some(crs) if crs.epsg == Some(self.target_epsg) => {}
            Some(Crs {
                epsg: Some(source_epsg),
                ..
            }) => match self.reproject(feature_set, source_epsg) {
                Ok(()) => {
                    tracing::info!(
                        from = %format!("EPSG:{}", source_epsg),
                        to = %format!("EPSG:{}", self.target_epsg),
                        features = feature_set.len(),
                        "Reprojected features"
                    );
                    feature_set.crs = Some(Crs::epsg(self.target_epsg));
                }
                Err(err) => {
                    tracing::warn!(
                        from = %format!("EPSG:{}", source_epsg),
                        error = %err,
                        "Reprojection failed; importing coordinates unmodified"
                    );
                }
            },
            Some(crs) => {
                tracing::warn!(
                    declared = ?crs.wkt,
                    "Could not resolve the declared CRS; importing coordinates unmodified"
                );
            }
        }
        Ok(())
    }

    fn reproject(&self, feature_set: &mut FeatureSet, source_epsg: u32) -> anyhow::Result<()> {
        let source = projection_for(source_epsg)?;
        let target = projection_for(self.target_epsg)?;

        // Transform into a scratch vector first so a failure partway
        // through leaves every row's coordinates untouched.
        let mut transformed = Vec::with_capacity(feature_set.len());
        for row in &feature_set.rows {
            transformed.push(match &row.geometry {
                Some(geometry) => Some(transform_geometry(geometry, &source, &target)?),
                None => None,
            });
        }
        for (row, geometry) in feature_set.rows.iter_mut().zip(transformed) {
            row.geometry = geometry;
        }
        Ok(())
    }
}

/// Build a proj pipeline definition for an EPSG code from the bundled
/// CRS catalog.
fn projection_for(epsg: u32) -> anyhow::Result<Proj> {
    let code = u16::try_from(epsg)
        .map_err(|_| anyhow::anyhow!("EPSG:{} is outside the known catalog", epsg))?;
    let def = crs_definitions::from_code(code)
        .ok_or_else(|| anyhow::anyhow!("EPSG:{} is not in the CRS catalog", epsg))?;
    Proj::from_proj_string(def.proj4)
        .map_err(|err| anyhow::anyhow!("Invalid projection for EPSG:{}: {}", epsg, err))
}

/// Transform every coordinate of a geometry. Geographic systems exchange
/// radians with the projection engine, so degrees are converted at both
/// ends when needed.
fn transform_geometry(
    geometry: &Geometry<f64>,
    source: &Proj,
    target: &Proj,
) -> anyhow::Result<Geometry<f64>> {
    geometry.try_map_coords(|coord| {
        let mut point = if source.is_latlong() {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        proj4rs::transform::transform(source, target, &mut point)
            .map_err(|err| anyhow::anyhow!("Coordinate transform failed: {}", err))?;
        let (x, y) = if target.is_latlong() {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };
        Ok(Coord { x, y })
    })
}
