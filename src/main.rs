mod app;
mod config;
mod dispatch;
mod error;
mod pipeline;
mod record;
mod sinks;
mod source;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;

use app::{Cli, ConvertOptions, convert};
use config::ConvertConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ConvertConfig::load(cli.config.as_deref())?;
    let options = ConvertOptions::from_cli(&cli, config);
    options.validate().context("CLI: invalid options")?;

    let start = std::time::Instant::now();
    let summary = convert(&options).with_context(|| {
        format!(
            "Failed to convert {:?} to {}",
            options.input,
            options.format.label()
        )
    })?;

    let elapsed = start.elapsed();
    tracing::info!(
        "Done! Written {} features from {} batches in {:.2}s ({} features/s)",
        summary.features,
        summary.batches,
        elapsed.as_secs_f64(),
        utils::per_second(summary.features, elapsed.as_secs_f64())
    );

    Ok(())
}
