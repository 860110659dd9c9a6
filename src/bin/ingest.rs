//! Loads a JSON Lines export of documentation pages into the chunk store.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use docqa_backend::core::config::{AppPaths, ConfigService};
use docqa_backend::core::logging;
use docqa_backend::rag::ingest::read_documents;
use docqa_backend::rag::{ChunkStore, Ingestor, SqliteChunkStore};
use docqa_backend::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "docqa-ingest", about = "Index documentation into the chunk store")]
struct Cli {
    /// JSON Lines file, one `{text, source, url?, title?, ...}` object per line
    input: PathBuf,

    /// Delete every stored chunk before ingesting
    #[arg(long)]
    reset: bool,

    /// Override the configured embedding batch size
    #[arg(long, env = "DOCQA_BATCH_SIZE")]
    batch_size: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = Arc::new(AppPaths::from_env());
    logging::init_with_prefix(&paths, "ingest.log");
    paths.log_resolved();

    let mut config = ConfigService::new(paths.clone())
        .load_settings()
        .context("Failed to load configuration")?;
    if let Some(batch_size) = cli.batch_size {
        config.ingest.batch_size = batch_size;
    }

    let file = File::open(&cli.input)
        .with_context(|| format!("Failed to open {}", cli.input.display()))?;
    let (documents, malformed) =
        read_documents(BufReader::new(file)).context("Failed to read input")?;
    tracing::info!(
        "Read {} documents from {} ({} malformed lines skipped)",
        documents.len(),
        cli.input.display(),
        malformed
    );

    let store = Arc::new(
        SqliteChunkStore::new(&paths)
            .await
            .context("Failed to open chunk store")?,
    );
    if cli.reset {
        let removed = store.clear().await.context("Failed to clear chunk store")?;
        tracing::info!("Removed {} existing chunks", removed);
    }

    let llm = AppState::build_llm(&config)?;
    let ingestor = Ingestor::new(store.clone(), llm, &config.ingest);
    let report = ingestor.ingest(&documents).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.batches_failed > 0 {
        anyhow::bail!("{} batches failed; rerun to retry them", report.batches_failed);
    }
    Ok(())
}
