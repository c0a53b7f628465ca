use super::{FeatureSink, OutputWriter, SinkState, create_output, sink_state, write_json};
use crate::error::ConvertError;
use geojson::Feature;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Newline-delimited features: one compact JSON document per line.
pub struct GeoJsonSeqSink {
    writer: Option<OutputWriter>,
    features_written: u64,
}

impl GeoJsonSeqSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConvertError> {
        let file = create_output(path.as_ref())?;
        Ok(Self::from_writer(Box::new(file)))
    }

    pub fn stdout() -> Self {
        Self::from_writer(Box::new(std::io::stdout()))
    }

    pub fn from_writer(inner: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Some(BufWriter::new(inner)),
            features_written: 0,
        }
    }
}

impl FeatureSink for GeoJsonSeqSink {
    fn write_feature(&mut self, feature: &Feature) -> Result<(), ConvertError> {
        let writer = self.writer.as_mut().ok_or(ConvertError::SinkClosed)?;
        write_json(writer, feature)?;
        writer.write_all(b"\n")?;
        self.features_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ConvertError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        let flushed = writer.flush();
        drop(writer);
        flushed.map_err(ConvertError::from)
    }

    fn state(&self) -> SinkState {
        sink_state(&self.writer, self.features_written)
    }

    fn features_written(&self) -> u64 {
        self.features_written
    }
}

impl Drop for GeoJsonSeqSink {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!("Output: failed to flush GeoJSON sequence: {}", err);
        }
    }
}
