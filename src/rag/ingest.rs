//! Offline ingestion: split source documents, embed in batches, upsert chunks.

use std::io::BufRead;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::splitter::{SplitterConfig, TextSplitter};
use super::store::{Chunk, ChunkMetadata, ChunkStore};
use crate::core::config::settings::IngestConfig;
use crate::core::errors::ApiError;
use crate::llm::LlmService;

/// One document to index, as read from a JSON Lines export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub text: String,
    pub source: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SourceDocument {
    fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            source: self.source.clone(),
            url: self.url.clone(),
            title: self.title.clone(),
            extra: self.extra.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub documents_skipped: usize,
    pub chunks_stored: usize,
    pub batches_failed: usize,
}

/// Parses JSON Lines. Blank lines are ignored; malformed lines are logged and
/// counted as skipped.
pub fn read_documents<R: BufRead>(reader: R) -> Result<(Vec<SourceDocument>, usize), ApiError> {
    let mut documents = Vec::new();
    let mut skipped = 0;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(ApiError::internal)?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SourceDocument>(&line) {
            Ok(doc) => documents.push(doc),
            Err(err) => {
                tracing::warn!("Skipping line {}: {}", line_no + 1, err);
                skipped += 1;
            }
        }
    }

    Ok((documents, skipped))
}

/// Stable id for a window: same document and text always map to the same row.
pub fn chunk_id(document: &SourceDocument, index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.source.as_bytes());
    hasher.update([0u8]);
    hasher.update(document.url.as_deref().unwrap_or("").as_bytes());
    hasher.update([0u8]);
    hasher.update((index as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct Ingestor {
    splitter: TextSplitter,
    llm: LlmService,
    store: Arc<dyn ChunkStore>,
    batch_size: usize,
}

impl Ingestor {
    pub fn new(store: Arc<dyn ChunkStore>, llm: LlmService, config: &IngestConfig) -> Self {
        Self {
            splitter: TextSplitter::new(SplitterConfig::from(config)),
            llm,
            store,
            batch_size: config.batch_size.max(1),
        }
    }

    fn chunk_documents(&self, documents: &[SourceDocument], report: &mut IngestReport) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for document in documents {
            if document.text.trim().is_empty() || document.source.trim().is_empty() {
                tracing::warn!(
                    url = document.url.as_deref().unwrap_or(""),
                    "Skipping document without text or source"
                );
                report.documents_skipped += 1;
                continue;
            }

            report.documents += 1;
            let metadata = document.metadata();
            for window in self.splitter.split(&document.text) {
                chunks.push(Chunk {
                    id: chunk_id(document, window.index, &window.text),
                    content: window.text,
                    metadata: metadata.clone(),
                });
            }
        }
        chunks
    }

    /// Embeds and stores every chunk. A failed batch is logged and skipped so
    /// one bad request does not abort a long run.
    pub async fn ingest(&self, documents: &[SourceDocument]) -> Result<IngestReport, ApiError> {
        let started = Instant::now();
        let mut report = IngestReport::default();
        let chunks = self.chunk_documents(documents, &mut report);
        let total_batches = chunks.len().div_ceil(self.batch_size);

        tracing::info!(
            "Ingesting {} chunks from {} documents in {} batches",
            chunks.len(),
            report.documents,
            total_batches
        );

        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            match self.store_batch(batch).await {
                Ok(stored) => {
                    report.chunks_stored += stored;
                    tracing::info!("Batch {}/{}: stored {} chunks", batch_no + 1, total_batches, stored);
                }
                Err(err) => {
                    report.batches_failed += 1;
                    tracing::warn!("Batch {}/{} failed: {}", batch_no + 1, total_batches, err);
                }
            }
        }

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ingestion finished: {} chunks stored, {} batches failed",
            report.chunks_stored,
            report.batches_failed
        );
        Ok(report)
    }

    async fn store_batch(&self, batch: &[Chunk]) -> Result<usize, ApiError> {
        let inputs: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.llm.embed(&inputs).await?;
        if embeddings.len() != batch.len() {
            return Err(ApiError::Internal(format!(
                "Expected {} embeddings, got {}",
                batch.len(),
                embeddings.len()
            )));
        }

        let items = batch.iter().cloned().zip(embeddings).collect();
        self.store.upsert(items).await
    }
}
