use arrow_array::RecordBatch;
use geojson::Feature;
use geozero::geojson::GeoJsonWriter;
use geozero::wkb::Wkb;
use geozero::{CoordDimensions, GeozeroGeometry};
use serde_json::Map;

use crate::error::{ConvertError, FeatureError};
use crate::record::{Record, RecordValue};
use crate::source::row_record;

pub mod flatten;

pub use self::flatten::{BBOX_COLUMN, flatten_properties};

pub const DEFAULT_GEOMETRY_COLUMN: &str = "geometry";

/// Features built from one source batch, in row order.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureBatch {
    pub index: usize,
    pub features: Vec<Feature>,
}

impl FeatureBatch {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Turns one source batch into features. Implementations run on worker threads.
pub trait BatchProcessor: Send + Sync {
    fn process_batch(&self, index: usize, batch: RecordBatch)
    -> Result<FeatureBatch, ConvertError>;
}

#[derive(Clone, Debug)]
pub struct FeatureBuilder {
    geometry_column: String,
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_GEOMETRY_COLUMN)
    }
}

impl FeatureBuilder {
    pub fn new(geometry_column: impl Into<String>) -> Self {
        Self {
            geometry_column: geometry_column.into(),
        }
    }

    pub fn build_feature(&self, mut row: Record) -> Result<Feature, FeatureError> {
        let wkb = match row.remove(&self.geometry_column) {
            None | Some(RecordValue::Null) => {
                return Err(FeatureError::MissingGeometry {
                    column: self.geometry_column.clone(),
                });
            }
            Some(RecordValue::Binary(bytes)) => bytes,
            Some(other) => {
                return Err(FeatureError::GeometryNotBinary {
                    column: self.geometry_column.clone(),
                    found: other.kind(),
                });
            }
        };

        let geometry = decode_wkb(&wkb)?;
        row.remove(BBOX_COLUMN);

        let mut properties = Map::new();
        flatten_properties(row, &mut properties, "", true);

        Ok(Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        })
    }
}

/// Decodes WKB (ISO or EWKB) straight into a GeoJSON geometry.
///
/// Z ordinates are kept when the source has them. M has no GeoJSON form and is
/// dropped.
fn decode_wkb(wkb: &[u8]) -> Result<geojson::Geometry, FeatureError> {
    let mut json = Vec::with_capacity(wkb.len() * 2);
    let mut writer = GeoJsonWriter::with_dims(&mut json, CoordDimensions::xyz());
    Wkb(wkb).process_geom(&mut writer)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Applies a [`FeatureBuilder`] to every row of a batch, stopping at the first failure.
#[derive(Clone, Debug, Default)]
pub struct BatchTransformer {
    builder: FeatureBuilder,
}

impl BatchTransformer {
    pub fn new(builder: FeatureBuilder) -> Self {
        Self { builder }
    }

    pub fn transform_batch(
        &self,
        index: usize,
        batch: &RecordBatch,
    ) -> Result<FeatureBatch, ConvertError> {
        let mut features = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let feature = row_record(batch, row)
                .and_then(|record| self.builder.build_feature(record))
                .map_err(|source| ConvertError::Row {
                    batch: index,
                    row,
                    source,
                })?;
            features.push(feature);
        }
        Ok(FeatureBatch { index, features })
    }
}

impl BatchProcessor for BatchTransformer {
    fn process_batch(
        &self,
        index: usize,
        batch: RecordBatch,
    ) -> Result<FeatureBatch, ConvertError> {
        self.transform_batch(index, &batch)
    }
}
