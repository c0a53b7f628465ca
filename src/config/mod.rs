use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_PREFIX: &str = "PARQUET2GEOJSON";

/// Tuning knobs for a conversion run.
///
/// Sources, lowest precedence first: built-in defaults, an optional YAML file,
/// `PARQUET2GEOJSON_*` environment variables. CLI flags are applied on top by
/// the caller.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ConvertConfig {
    /// Falls back to the GeoParquet primary column, then `geometry`.
    pub geometry_column: Option<String>,
    pub batch_size: usize,
    pub in_flight_per_worker: usize,
    pub progress_interval: u64,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            geometry_column: None,
            // Same row count per batch as pyarrow's `iter_batches`
            batch_size: 65_536,
            in_flight_per_worker: 2,
            progress_interval: 100_000,
        }
    }
}

impl ConvertConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        let settings = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Config: failed to load settings")?;

        let config: Self = settings
            .try_deserialize()
            .context("Config: invalid settings")?;
        config.validate().context("Config: invalid settings")?;
        Ok(config)
    }

    /// Shared by the settings loader and by the CLI once its flags are applied.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.in_flight_per_worker == 0 {
            bail!("in_flight_per_worker must be at least 1");
        }
        if self.progress_interval == 0 {
            bail!("progress_interval must be at least 1");
        }
        if matches!(self.geometry_column.as_deref(), Some("")) {
            bail!("geometry_column must not be empty");
        }
        Ok(())
    }
}
