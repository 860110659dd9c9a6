//! Chunk store contract: the schema and query interface the answer pipeline
//! relies on. `SqliteChunkStore` in the `sqlite` module is the bundled backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::ApiError;

/// Metadata carried by every chunk.
///
/// Only `url` matters to ranking; everything source-specific (`packageName`,
/// `commandName`, `filePath`, ...) rides along in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Origin category, e.g. "pdq-powershell" or "powershell-gallery".
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChunkMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Boundary validation: `source` is required, blank `url`/`title` become absent.
    pub fn validated(mut self) -> Result<Self, ApiError> {
        if self.source.trim().is_empty() {
            return Err(ApiError::Validation(
                "Chunk metadata requires a non-empty source".to_string(),
            ));
        }
        self.url = self.url.filter(|u| !u.trim().is_empty());
        self.title = self.title.filter(|t| !t.trim().is_empty());
        Ok(self)
    }
}

/// An indexed passage of documentation. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn validated(self) -> Result<Self, ApiError> {
        if self.content.trim().is_empty() {
            return Err(ApiError::Validation(format!(
                "Chunk {} has empty content",
                self.id
            )));
        }
        Ok(Self {
            metadata: self.metadata.validated()?,
            ..self
        })
    }
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub include_metadata: bool,
}

/// One nearest-neighbour hit. `score` is cosine similarity clamped to `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub content: String,
    pub metadata: Option<ChunkMetadata>,
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert or replace chunks with their embeddings in one batch.
    async fn upsert(&self, items: Vec<(Chunk, Vec<f32>)>) -> Result<usize, ApiError>;

    /// Return at most `top_k` matches, descending by raw similarity.
    async fn query(&self, request: &QueryRequest) -> Result<Vec<QueryMatch>, ApiError>;

    /// Total number of stored chunks.
    async fn count(&self) -> Result<usize, ApiError>;

    /// Drop every chunk (full re-ingestion).
    async fn clear(&self) -> Result<usize, ApiError>;
}
