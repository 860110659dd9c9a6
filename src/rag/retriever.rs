use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use super::store::{ChunkMetadata, ChunkStore, QueryMatch, QueryRequest};
use crate::core::errors::ApiError;
use crate::llm::LlmService;

/// A chunk scored against one query. Lives for a single request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub id: String,
    pub content: String,
    pub metadata: Option<ChunkMetadata>,
    pub score: f32,
}

impl Candidate {
    pub fn url(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.url.as_deref())
    }
}

impl From<QueryMatch> for Candidate {
    fn from(m: QueryMatch) -> Self {
        Self {
            id: m.id,
            content: m.content,
            metadata: m.metadata,
            score: m.score,
        }
    }
}

pub fn augmented_query(question: &str, concepts: &str) -> String {
    format!("{} {}", question, concepts)
}

#[derive(Clone)]
pub struct CandidateRetriever {
    store: Arc<dyn ChunkStore>,
    llm: LlmService,
    top_k: usize,
}

impl CandidateRetriever {
    pub fn new(store: Arc<dyn ChunkStore>, llm: LlmService, top_k: usize) -> Self {
        Self { store, llm, top_k }
    }

    /// Embeds `"<question> <concepts>"` and returns up to `top_k` nearest chunks.
    /// No filtering happens here; embedding or store failures propagate.
    pub async fn retrieve(&self, question: &str, concepts: &str) -> Result<Vec<Candidate>, ApiError> {
        let started = Instant::now();
        let query_text = augmented_query(question, concepts);
        let vector = self.llm.embed_query(&query_text).await?;

        let request = QueryRequest {
            vector,
            top_k: self.top_k,
            include_metadata: true,
        };
        let matches = self.store.query(&request).await?;

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Retrieved {} candidates (top_k={})",
            matches.len(),
            self.top_k
        );

        Ok(matches.into_iter().map(Candidate::from).collect())
    }
}
