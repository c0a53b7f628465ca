use ::geojson::Feature;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::ConvertError;
use crate::pipeline::FeatureBatch;

pub mod geojson;
pub mod geojsonseq;

pub use self::geojson::GeoJsonSink;
pub use self::geojsonseq::GeoJsonSeqSink;

pub type OutputWriter = BufWriter<Box<dyn Write + Send>>;

/// Framing state of an output stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkState {
    Empty,
    HasFeatures,
    Closed,
}

/// Sole owner of the output stream. Features are written in call order.
pub trait FeatureSink {
    fn write_feature(&mut self, feature: &Feature) -> Result<(), ConvertError>;

    fn write_batch(&mut self, batch: &FeatureBatch) -> Result<(), ConvertError> {
        for feature in &batch.features {
            self.write_feature(feature)?;
        }
        Ok(())
    }

    /// Finalizes the stream once and releases it, even when finalization fails.
    /// Later calls are no-ops.
    fn close(&mut self) -> Result<(), ConvertError>;

    fn state(&self) -> SinkState;

    fn features_written(&self) -> u64;
}

pub fn create_output(path: &Path) -> Result<File, ConvertError> {
    File::create(path).map_err(|source| ConvertError::CreateOutput {
        path: path.to_path_buf(),
        source,
    })
}

fn sink_state(writer: &Option<OutputWriter>, features_written: u64) -> SinkState {
    match (writer, features_written) {
        (None, _) => SinkState::Closed,
        (Some(_), 0) => SinkState::Empty,
        (Some(_), _) => SinkState::HasFeatures,
    }
}

/// Compact JSON, no whitespace between tokens.
fn write_json(writer: &mut OutputWriter, feature: &Feature) -> Result<(), ConvertError> {
    serde_json::to_writer(writer, feature).map_err(|err| {
        if err.is_io() {
            ConvertError::Write(err.into())
        } else {
            ConvertError::Encode(err)
        }
    })
}
