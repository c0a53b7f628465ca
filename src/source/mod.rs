use arrow_array::RecordBatch;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::file::metadata::KeyValue;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::ConvertError;

pub mod values;

pub use self::values::row_record;

/// Lazy reader over the row batches of a Parquet file.
pub struct BatchSource {
    reader: ParquetRecordBatchReader,
    path: PathBuf,
    num_rows: i64,
    geo_metadata: Option<String>,
    batches_read: usize,
}

impl BatchSource {
    pub fn open<P: AsRef<Path>>(path: P, batch_size: usize) -> Result<Self, ConvertError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|err| ConvertError::Input {
            path: path.clone(),
            reason: err.to_string(),
        })?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|source| {
            ConvertError::OpenParquet {
                path: path.clone(),
                source,
            }
        })?;

        let file_metadata = builder.metadata().file_metadata();
        let num_rows = file_metadata.num_rows();
        let geo_metadata = file_metadata
            .key_value_metadata()
            .and_then(|entries| find_geo_metadata(entries));

        let reader = builder
            .with_batch_size(batch_size.max(1))
            .build()
            .map_err(|source| ConvertError::OpenParquet {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            reader,
            path,
            num_rows,
            geo_metadata,
            batches_read: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_rows(&self) -> i64 {
        self.num_rows
    }

    /// Primary geometry column declared by GeoParquet `geo` metadata.
    pub fn geo_primary_column(&self) -> Option<String> {
        let raw = self.geo_metadata.as_deref()?;
        let geo: serde_json::Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("Input: ignoring unparsable GeoParquet metadata: {}", err);
                return None;
            }
        };

        let primary = geo.get("primary_column")?.as_str()?.to_string();
        if let Some(encoding) = geo
            .pointer(&format!("/columns/{}/encoding", escape_pointer(&primary)))
            .and_then(|value| value.as_str())
            && !encoding.eq_ignore_ascii_case("wkb")
        {
            tracing::warn!(
                "Input: geometry column {:?} declares {} encoding; only WKB is decoded",
                primary,
                encoding
            );
        }
        Some(primary)
    }
}

impl Iterator for BatchSource {
    type Item = Result<RecordBatch, ConvertError>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = self.batches_read;
        let next = self.reader.next()?;
        self.batches_read += 1;
        Some(next.map_err(|source| ConvertError::ReadBatch { batch, source }))
    }
}

fn find_geo_metadata(entries: &[KeyValue]) -> Option<String> {
    entries
        .iter()
        .find(|entry| entry.key == "geo")
        .and_then(|entry| entry.value.clone())
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
