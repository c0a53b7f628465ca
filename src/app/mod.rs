use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ConvertConfig;
use crate::dispatch::{DispatchSettings, dispatch};
use crate::error::ConvertError;
use crate::pipeline::{BatchTransformer, DEFAULT_GEOMETRY_COLUMN, FeatureBuilder};
use crate::sinks::{FeatureSink, GeoJsonSeqSink, GeoJsonSink, SinkState};
use crate::source::BatchSource;
use crate::utils::{ProgressCounter, expand_home};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input Parquet or GeoParquet file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file, or `-` for stdout
    #[arg(short, long)]
    pub output: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::GeoJson)]
    pub format: OutputFormat,

    /// Number of worker threads
    #[arg(short = 'w', long, default_value_t = 1)]
    pub num_workers: usize,

    /// Settings file (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Column holding WKB geometries (default: GeoParquet primary column, else `geometry`)
    #[arg(long)]
    pub geometry_column: Option<String>,

    /// Rows per record batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum OutputFormat {
    #[value(name = "geojson")]
    GeoJson,
    #[value(name = "geojsonseq")]
    GeoJsonSeq,
}

impl OutputFormat {
    pub fn label(&self) -> &'static str {
        match self {
            OutputFormat::GeoJson => "geojson",
            OutputFormat::GeoJsonSeq => "geojsonseq",
        }
    }
}

/// Everything a run needs, after CLI flags have been layered over the settings.
#[derive(Clone, Debug)]
pub struct ConvertOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub format: OutputFormat,
    pub num_workers: usize,
    pub settings: ConvertConfig,
    pub verbose: bool,
}

impl ConvertOptions {
    pub fn from_config(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        format: OutputFormat,
        settings: ConvertConfig,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            format,
            num_workers: 1,
            settings,
            verbose: false,
        }
    }

    pub fn from_cli(cli: &Cli, config: ConvertConfig) -> Self {
        let mut options = Self::from_config(&cli.input, &cli.output, cli.format, config);
        options.num_workers = cli.num_workers;
        options.verbose = cli.verbose;
        if let Some(column) = &cli.geometry_column {
            options.settings.geometry_column = Some(column.clone());
        }
        if let Some(batch_size) = cli.batch_size {
            options.settings.batch_size = batch_size;
        }
        options
    }

    /// Re-checks the settings once CLI overrides have been applied.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.settings.validate()
    }

    fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            num_workers: self.num_workers,
            in_flight_per_worker: self.settings.in_flight_per_worker,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConvertSummary {
    pub batches: u64,
    pub features: u64,
}

pub fn init_sink(format: OutputFormat, output: &Path) -> Result<Box<dyn FeatureSink>, ConvertError> {
    if output == Path::new("-") {
        tracing::info!("Sink: {} -> stdout", format.label());
        return Ok(match format {
            OutputFormat::GeoJson => Box::new(GeoJsonSink::stdout()?),
            OutputFormat::GeoJsonSeq => Box::new(GeoJsonSeqSink::stdout()),
        });
    }

    let output = expand_home(output);
    tracing::info!("Sink: {} -> {:?}", format.label(), output);
    Ok(match format {
        OutputFormat::GeoJson => Box::new(GeoJsonSink::new(&output)?),
        OutputFormat::GeoJsonSeq => Box::new(GeoJsonSeqSink::new(&output)?),
    })
}

pub fn validate_input(path: &Path) -> Result<(), ConvertError> {
    let metadata = std::fs::metadata(path).map_err(|err| ConvertError::Input {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    if !metadata.is_file() {
        return Err(ConvertError::Input {
            path: path.to_path_buf(),
            reason: "not a regular file".to_string(),
        });
    }
    Ok(())
}

/// Explicit choice first, then the file's GeoParquet metadata, then `geometry`.
fn resolve_geometry_column(options: &ConvertOptions, source: &BatchSource) -> String {
    if let Some(column) = &options.settings.geometry_column {
        return column.clone();
    }
    source
        .geo_primary_column()
        .unwrap_or_else(|| DEFAULT_GEOMETRY_COLUMN.to_string())
}

/// Converts `options.input` into `options.output`.
///
/// The output is closed on every path once it has been opened, so a failed run
/// still leaves a well-formed document holding the batches written before the
/// failure.
pub fn convert(options: &ConvertOptions) -> Result<ConvertSummary, ConvertError> {
    validate_input(&options.input)?;
    let source = BatchSource::open(&options.input, options.settings.batch_size)?;
    let geometry_column = resolve_geometry_column(options, &source);

    tracing::info!("Read: {:?} ({} rows)", source.path(), source.num_rows());
    tracing::info!("Write: {} - {:?}", options.format.label(), options.output);
    tracing::info!("Workers: {}", options.num_workers);
    tracing::info!("Geometry column: {}", geometry_column);

    let mut sink = init_sink(options.format, &options.output)?;
    let written = write_all(options, source, geometry_column, sink.as_mut());
    if sink.state() == SinkState::Empty {
        tracing::warn!("Output: no features were written");
    }
    let closed = sink.close();

    match (written, closed) {
        (Ok(summary), Ok(())) => Ok(summary),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            tracing::warn!("Output: failed to close after error: {}", close_err);
            Err(err)
        }
    }
}

fn write_all(
    options: &ConvertOptions,
    source: BatchSource,
    geometry_column: String,
    sink: &mut dyn FeatureSink,
) -> Result<ConvertSummary, ConvertError> {
    let transformer = Arc::new(BatchTransformer::new(FeatureBuilder::new(geometry_column)));
    let batches = dispatch(source, transformer, options.dispatch_settings())?;
    let mut progress = ProgressCounter::new(
        "Writing",
        options.settings.progress_interval,
        options.verbose,
    );

    for batch in batches {
        let batch = batch?;
        if !batch.is_empty() {
            sink.write_batch(&batch)?;
        }
        progress.add_batch(batch.len() as u64);
    }

    progress.finish();
    Ok(ConvertSummary {
        batches: progress.batches(),
        features: sink.features_written(),
    })
}
