use super::{FeatureSink, OutputWriter, SinkState, create_output, sink_state, write_json};
use crate::error::ConvertError;
use geojson::Feature;
use std::io::{BufWriter, Write};
use std::path::Path;

const COLLECTION_HEADER: &[u8] = b"{\"type\": \"FeatureCollection\", \"features\": [\n";
const FEATURE_SEPARATOR: &[u8] = b",\n";
const COLLECTION_TRAILER: &[u8] = b"]}\n";

/// Writes a single FeatureCollection document, one feature at a time.
///
/// The header is written on creation and the trailer on [`FeatureSink::close`],
/// so a closed sink always holds a complete document.
pub struct GeoJsonSink {
    writer: Option<OutputWriter>,
    features_written: u64,
}

impl GeoJsonSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConvertError> {
        let file = create_output(path.as_ref())?;
        Self::from_writer(Box::new(file))
    }

    pub fn stdout() -> Result<Self, ConvertError> {
        Self::from_writer(Box::new(std::io::stdout()))
    }

    pub fn from_writer(inner: Box<dyn Write + Send>) -> Result<Self, ConvertError> {
        let mut writer = BufWriter::new(inner);
        writer.write_all(COLLECTION_HEADER)?;
        Ok(Self {
            writer: Some(writer),
            features_written: 0,
        })
    }
}

impl FeatureSink for GeoJsonSink {
    fn write_feature(&mut self, feature: &Feature) -> Result<(), ConvertError> {
        let writer = self.writer.as_mut().ok_or(ConvertError::SinkClosed)?;
        if self.features_written > 0 {
            writer.write_all(FEATURE_SEPARATOR)?;
        }
        write_json(writer, feature)?;
        self.features_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ConvertError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        let finalized = writer
            .write_all(COLLECTION_TRAILER)
            .and_then(|()| writer.flush());
        drop(writer);
        finalized.map_err(ConvertError::from)
    }

    fn state(&self) -> SinkState {
        sink_state(&self.writer, self.features_written)
    }

    fn features_written(&self) -> u64 {
        self.features_written
    }
}

impl Drop for GeoJsonSink {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!("Output: failed to finalize GeoJSON document: {}", err);
        }
    }
}
