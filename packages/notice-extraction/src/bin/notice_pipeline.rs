//! Notice pipeline CLI
//!
//! Runs the pipeline over local files and prints the finalized run and the
//! pending review queue as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use notice_extraction::{
    Document, DocumentKind, IngestionRun, MemoryStore, OpenAiOracle, Oracle, Pipeline,
    PipelineConfig, ReviewQueueItem, RunStatus, Storage, UnavailableOracle,
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "notice-pipeline")]
#[command(about = "Extract, deduplicate and score gazette notices, filings and articles")]
struct Cli {
    /// Kind of every input document: gazette, case_filing or article
    #[arg(long, default_value = "gazette")]
    kind: DocumentKind,

    /// Input text files, one document each
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// JSON pipeline config; environment overrides are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the oracle and rely on patterns and heuristics only
    #[arg(long)]
    offline: bool,

    /// Postgres connection string, falling back to `DATABASE_URL`
    /// (requires the `postgres` feature)
    #[arg(long)]
    database_url: Option<String>,
}

#[derive(Serialize)]
struct Report {
    run: IngestionRun,
    pending_reviews: Vec<ReviewQueueItem>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notice_extraction=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            PipelineConfig::from_json(&json).context("Invalid pipeline config")?
        }
        None => PipelineConfig::from_env().context("Invalid pipeline environment")?,
    };

    let documents = load_documents(cli.kind, &cli.inputs)?;

    let oracle: Arc<dyn Oracle> = if cli.offline {
        tracing::info!("Offline mode: oracle disabled");
        Arc::new(UnavailableOracle)
    } else {
        Arc::new(OpenAiOracle::from_env().context("OPENAI_API_KEY must be set (or pass --offline)")?)
    };

    let database_url = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let report = match database_url.as_deref() {
        #[cfg(feature = "postgres")]
        Some(url) => {
            let store = notice_extraction::PostgresStore::new(url)
                .await
                .context("Failed to connect to database")?;
            execute(store, oracle, config, &documents).await?
        }
        #[cfg(not(feature = "postgres"))]
        Some(_) => {
            tracing::warn!("DATABASE_URL ignored: built without the postgres feature");
            execute(MemoryStore::new(), oracle, config, &documents).await?
        }
        None => execute(MemoryStore::new(), oracle, config, &documents).await?,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.run.status == RunStatus::Failed {
        anyhow::bail!("run {} failed", report.run.id);
    }
    Ok(())
}

async fn execute<S: Storage>(
    store: S,
    oracle: Arc<dyn Oracle>,
    config: PipelineConfig,
    documents: &[Document],
) -> Result<Report> {
    let pipeline = Pipeline::new(store, oracle, config);
    let run = pipeline.run(documents).await;
    let pending_reviews = pipeline
        .pending_reviews()
        .await
        .context("Failed to read review queue")?;
    Ok(Report {
        run,
        pending_reviews,
    })
}

fn load_documents(kind: DocumentKind, inputs: &[PathBuf]) -> Result<Vec<Document>> {
    inputs
        .iter()
        .map(|path| {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(Document::new(id, kind, text))
        })
        .collect()
}
