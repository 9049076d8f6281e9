//! clipforge - merge and trim video clips from the command line
//!
//! Drives one edit session end to end: upload the given files, merge them,
//! optionally trim the result, and write the downloadable artifact to disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipforge_core::{
    create_backend, load_config, validate_config, Config, EditSession, Engine, FfmpegEngine,
    LogFormat, LoggingConfig, MediaHandle, ProcessingBackend, SessionSnapshot, Stage, UploadFile,
};

#[derive(Parser)]
#[command(name = "clipforge")]
#[command(about = "Merge video clips and trim the result")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "CLIPFORGE_CONFIG", default_value = "clipforge.toml")]
    config: PathBuf,

    /// Clips to merge, in order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Trim start in seconds
    #[arg(long, requires = "end")]
    start: Option<f64>,

    /// Trim end in seconds
    #[arg(long, requires = "start")]
    end: Option<f64>,

    /// Duration of the merged media in seconds, skipping the ffprobe lookup
    #[arg(long)]
    duration: Option<f64>,

    /// Where to write the result
    #[arg(short, long, default_value = "output.mp4")]
    output: PathBuf,

    /// Print the final session summary as JSON
    #[arg(long)]
    summary: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| {
            tracing_subscriber::EnvFilter::try_new(
                logging.filter.as_deref().unwrap_or("info,clipforge_core=info"),
            )
        })
        .unwrap_or_else(|_| "info".into());

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    validate_config(&config).context("Configuration validation failed")?;
    init_tracing(&config.logging);
    info!("Loaded configuration from {:?}", cli.config);
    info!("Backend: {:?}", config.backend.kind);

    let backend = create_backend(&config.backend).context("Failed to create backend")?;
    backend
        .initialize()
        .await
        .context("Failed to initialize backend")?;

    let session: EditSession = EditSession::with_limits(Arc::clone(&backend), config.upload.clone());

    let mut files = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        let file = UploadFile::from_path(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        files.push(file);
    }

    session.upload(files).context("Upload rejected")?;
    let merged = finish(&session, Stage::Merged).await?;
    let working = merged
        .working_handle
        .context("Merge produced no media")?;
    info!(
        bytes = working.size_bytes(),
        file_name = working.file_name(),
        "Merged"
    );

    if let (Some(start), Some(end)) = (cli.start, cli.end) {
        let duration = match cli.duration {
            Some(duration) => Some(duration),
            None => probe_duration(&config, &working).await,
        };
        if let Some(duration) = duration {
            session
                .report_duration(duration)
                .context("Invalid media duration")?;
        }

        session
            .set_trim_range(start, end)
            .context("Trim range rejected")?;
        session.trim().context("Trim rejected")?;
        finish(&session, Stage::Trimmed).await?;
    }

    let snapshot = session.snapshot();
    let artifact = snapshot
        .downloadable()
        .context("Nothing to download")?;
    write_artifact(artifact, &cli.output).await?;

    if cli.summary {
        println!("{}", serde_json::to_string_pretty(&snapshot.summary())?);
    }
    Ok(())
}

/// Waits for the running job and fails unless it reached `expected`.
async fn finish(session: &EditSession, expected: Stage) -> Result<SessionSnapshot> {
    let snapshot = session.settled().await;
    if snapshot.stage != expected {
        match &snapshot.last_error {
            Some(e) => bail!("{:?} failed: {}", expected, e),
            None => bail!("Session ended in {:?} instead of {:?}", snapshot.stage, expected),
        }
    }
    Ok(snapshot)
}

/// Reads the merged media's duration with ffprobe, standing in for a player's
/// metadata callback.
async fn probe_duration(config: &Config, media: &MediaHandle) -> Option<f64> {
    let engine = FfmpegEngine::new(config.backend.embedded.clone().unwrap_or_default());
    if let Err(e) = engine.load().await {
        warn!("Cannot probe duration: {}", e);
        return None;
    }
    match engine.probe_info(media).await {
        Ok(info) => {
            info!(duration_secs = info.duration_secs, format = %info.format, "Probed merged media");
            Some(info.duration_secs)
        }
        Err(e) => {
            warn!("Cannot probe duration: {}", e);
            None
        }
    }
}

async fn write_artifact(media: &MediaHandle, path: &Path) -> Result<()> {
    let bytes = media.require_bytes()?;
    tokio::fs::write(path, &bytes)
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;
    info!(bytes = bytes.len(), path = %path.display(), "Wrote {}", media.file_name());
    Ok(())
}
