use arrow_schema::{ArrowError, DataType};
use geozero::error::GeozeroError;
use parquet::errors::ParquetError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn a single row into a feature.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("missing geometry column `{column}`")]
    MissingGeometry { column: String },

    #[error("geometry column `{column}` holds {found}, expected WKB bytes")]
    GeometryNotBinary { column: String, found: &'static str },

    #[error("failed to decode WKB geometry: {0}")]
    GeometryDecode(#[from] GeozeroError),

    #[error("decoded geometry is not valid GeoJSON: {0}")]
    GeometryJson(#[from] serde_json::Error),

    #[error("column `{column}` has unsupported type {data_type}")]
    UnsupportedType { column: String, data_type: DataType },
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Input: {}: {reason}", path.display())]
    Input { path: PathBuf, reason: String },

    #[error("Input: failed to open parquet file {}: {source}", path.display())]
    OpenParquet {
        path: PathBuf,
        #[source]
        source: ParquetError,
    },

    #[error("Input: failed to read batch {batch}: {source}")]
    ReadBatch {
        batch: usize,
        #[source]
        source: ArrowError,
    },

    #[error("Pipeline: batch {batch}, row {row}: {source}")]
    Row {
        batch: usize,
        row: usize,
        #[source]
        source: FeatureError,
    },

    #[error("Pipeline: worker exited without returning batch {batch}")]
    WorkerLost { batch: usize },

    #[error("Pipeline: failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Output: failed to create {}: {source}", path.display())]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output: write failed: {0}")]
    Write(#[from] std::io::Error),

    #[error("Output: failed to encode feature: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Output: stream is already closed")]
    SinkClosed,
}

impl ConvertError {
    /// Position of the batch this error belongs to, when it has one.
    pub fn batch(&self) -> Option<usize> {
        match self {
            ConvertError::ReadBatch { batch, .. }
            | ConvertError::Row { batch, .. }
            | ConvertError::WorkerLost { batch } => Some(*batch),
            _ => None,
        }
    }
}
