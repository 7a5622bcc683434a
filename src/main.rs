use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use story_insights::acquire::Acquirer;
use story_insights::analysis::BasicAnalyzer;
use story_insights::catalog::{Catalog, LocalCatalog, RemoteCatalog};
use story_insights::config::Config;
use story_insights::pipeline::Pipeline;
use story_insights::report::CsvSink;
use story_insights::transcribe::{TranscriptStore, WhisperCliTranscriber};
use story_insights::trim::{FfmpegCodec, Trimmer};

#[derive(Parser, Debug)]
#[command(name = "story-insights", about = "Batch transcription and linguistic analysis for spoken-story audio", version)]
struct Args {
    /// YAML config file; defaults are used when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Process audio files from this directory instead of the remote catalog
    #[arg(long)]
    local_dir: Option<PathBuf>,

    /// Override the catalog API endpoint
    #[arg(long)]
    api_url: Option<String>,

    /// Override the root directory for caches and the report
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the head-trim duration in seconds
    #[arg(long)]
    trim_seconds: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(url) = args.api_url {
        config.api_url = url;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(secs) = args.trim_seconds {
        config.trim_seconds = secs;
    }

    config.prepare_dirs().context("failed to create cache directories")?;

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let catalog = match args.local_dir {
        Some(dir) => Catalog::Local(LocalCatalog::new(dir)),
        None => Catalog::Remote(RemoteCatalog::new(
            client.clone(),
            config.api_url.clone(),
            config.base_audio_url.clone(),
            config.catalog_cache(),
        )),
    };

    let mut pipeline = Pipeline::new(
        catalog,
        Acquirer::new(client, config.audio_dir()),
        Trimmer::new(FfmpegCodec::new(), config.trim_seconds),
        TranscriptStore::new(config.transcript_dir()),
        WhisperCliTranscriber::new(
            config.whisper_cli.clone(),
            config.whisper_model.clone(),
            config.language.clone(),
        ),
        BasicAnalyzer,
        CsvSink::new(config.output_csv()),
    );

    let summary = pipeline.run().await?;

    println!(
        "done: {} processed, {} already complete, {} excluded, {} failed",
        summary.completed,
        summary.already_done,
        summary.excluded,
        summary.failures.len()
    );
    for failure in &summary.failures {
        println!(
            "  failed [{}] nid={} {}: {}",
            failure.stage, failure.key, failure.title, failure.message
        );
    }

    Ok(())
}
