//! `dx`: display a CSV file the way the notebook formatter would
//!
//! Rendered payloads are printed to stdout as JSON lines. With `--filters`
//! the displayed dataset is resampled once and the update is printed too.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dx_core::{Bindings, DisplayMode, DisplaySettings, FilterSpec};
use dx_data::{CsvOptions, CsvSource};
use dx_display::{DisplaySession, JsonLinesRenderer, ResampleRequest};

#[derive(Parser, Debug)]
#[command(name = "dx", about = "Display and resample tabular data")]
struct Args {
    /// CSV file to display
    csv: PathBuf,

    /// JSON settings file; `DX_*` environment variables apply on top
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Payload shape: simple or enhanced
    #[arg(long)]
    mode: Option<DisplayMode>,

    #[arg(long)]
    max_rows: Option<usize>,

    #[arg(long)]
    max_columns: Option<usize>,

    /// Column promoted to the index
    #[arg(long)]
    index: Option<String>,

    /// Variable name the data is bound to, defaults to the file stem
    #[arg(long)]
    name: Option<String>,

    /// Display without tracking
    #[arg(long)]
    no_tracking: bool,

    /// JSON array of filters to resample with after displaying
    #[arg(long)]
    filters: Option<String>,

    /// Row limit for the resample query
    #[arg(long)]
    limit: Option<usize>,
}

fn load_settings(args: &Args) -> Result<DisplaySettings> {
    let mut settings = match &args.settings {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings {:?}", path))?;
            DisplaySettings::from_json(&text).context("Invalid settings file")?
        }
        None => DisplaySettings::default(),
    };
    settings.apply_env_vars(std::env::vars());

    if let Some(mode) = args.mode {
        settings.display_mode = mode;
    }
    if let Some(max_rows) = args.max_rows {
        settings.max_rows = max_rows;
    }
    if let Some(max_columns) = args.max_columns {
        settings.max_columns = max_columns;
    }
    if args.no_tracking {
        settings.tracking_enabled = false;
    }
    Ok(settings)
}

fn main() -> Result<()> {
    // stdout carries the payloads
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dx_app=info,dx_display=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let settings = load_settings(&args)?;

    let options = CsvOptions {
        index_column: args.index.clone(),
        ..Default::default()
    };
    let frame = Arc::new(
        CsvSource::load(&args.csv, &options)
            .with_context(|| format!("Failed to load {:?}", args.csv))?,
    );

    let name = args.name.clone().unwrap_or_else(|| {
        args.csv
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "data".to_string())
    });
    let mut bindings = Bindings::new();
    bindings.bind(name, frame.clone());

    let renderer = Arc::new(JsonLinesRenderer::new(std::io::stdout()));
    let session = DisplaySession::in_memory(settings, renderer)?;

    let outcome = session.dispatcher().display(frame.as_ref().clone(), &bindings)?;
    info!(
        "Displayed {} of {} rows at slot {}",
        outcome.report.after.num_rows, outcome.report.before.num_rows, outcome.display_slot
    );

    if let Some(filters) = &args.filters {
        if !outcome.is_tracked() {
            anyhow::bail!("Cannot resample: the dataset is not tracked");
        }
        let filters: Vec<FilterSpec> =
            serde_json::from_str(filters).context("Invalid --filters JSON")?;
        let request = ResampleRequest {
            limit: args.limit,
            ..ResampleRequest::new(outcome.display_slot.clone(), filters)
        };
        let message = serde_json::to_string(&request)?;
        if let Some(resampled) = session.resampler().handle_message(&message)? {
            info!("Resampled to {} rows", resampled.num_rows());
        }
    }

    Ok(())
}
