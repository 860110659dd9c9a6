//! SQLite-backed chunk store.
//!
//! In-process vector store using SQLite for chunk rows and
//! brute-force cosine similarity for search.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{Chunk, ChunkMetadata, ChunkStore, QueryMatch, QueryRequest};
use crate::core::config::AppPaths;
use crate::core::errors::ApiError;

pub struct SqliteChunkStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteChunkStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::with_path(paths.db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS doc_chunks (
                chunk_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL,
                url TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_doc_chunks_source ON doc_chunks(source)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_metadata(row: &sqlx::sqlite::SqliteRow) -> Option<ChunkMetadata> {
        let metadata_str: String = row.get("metadata");
        match serde_json::from_str::<ChunkMetadata>(&metadata_str) {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                let chunk_id: String = row.get("chunk_id");
                tracing::warn!("Ignoring malformed metadata on chunk {}: {}", chunk_id, err);
                None
            }
        }
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn upsert(&self, items: Vec<(Chunk, Vec<f32>)>) -> Result<usize, ApiError> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        let mut written = 0;

        for (chunk, embedding) in items {
            let chunk = chunk.validated()?;
            if embedding.is_empty() {
                return Err(ApiError::Validation(format!(
                    "Chunk {} has an empty embedding",
                    chunk.id
                )));
            }

            let blob = Self::serialize_embedding(&embedding);
            let metadata_str = serde_json::to_string(&chunk.metadata).map_err(ApiError::internal)?;

            sqlx::query(
                "INSERT OR REPLACE INTO doc_chunks (chunk_id, content, source, url, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&chunk.id)
            .bind(&chunk.content)
            .bind(&chunk.metadata.source)
            .bind(chunk.metadata.url.as_deref())
            .bind(&metadata_str)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

            written += 1;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(written)
    }

    async fn query(&self, request: &QueryRequest) -> Result<Vec<QueryMatch>, ApiError> {
        if request.top_k == 0 || request.vector.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT chunk_id, content, metadata, embedding
             FROM doc_chunks
             ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored: Vec<QueryMatch> = rows
            .iter()
            .map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                let stored_emb = Self::deserialize_embedding(&embedding_bytes);
                let score = Self::cosine_similarity(&request.vector, &stored_emb).clamp(0.0, 1.0);

                QueryMatch {
                    id: row.get("chunk_id"),
                    score,
                    content: row.get("content"),
                    metadata: if request.include_metadata {
                        Self::row_metadata(row)
                    } else {
                        None
                    },
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(request.top_k);

        Ok(scored)
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM doc_chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(count as usize)
    }

    async fn clear(&self) -> Result<usize, ApiError> {
        let result = sqlx::query("DELETE FROM doc_chunks")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (tempfile::TempDir, SqliteChunkStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteChunkStore::with_path(tmp.path().join("chunks.db"))
            .await
            .unwrap();
        (tmp, store)
    }

    fn make_chunk(id: &str, content: &str, url: Option<&str>) -> Chunk {
        let mut metadata = ChunkMetadata::new("pdq-powershell");
        metadata.url = url.map(str::to_string);
        Chunk {
            id: id.to_string(),
            content: content.to_string(),
            metadata,
        }
    }

    fn query(vector: Vec<f32>, top_k: usize) -> QueryRequest {
        QueryRequest {
            vector,
            top_k,
            include_metadata: true,
        }
    }

    #[tokio::test]
    async fn ingested_chunk_is_top_match_for_its_own_embedding() {
        let (_tmp, store) = test_store().await;
        let embedding = vec![0.3, 0.5, 0.8];

        store
            .upsert(vec![
                (make_chunk("c1", "Restart-Service restarts a service", Some("https://x")), embedding.clone()),
                (make_chunk("c2", "Unrelated", None), vec![-0.8, 0.1, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.query(&query(embedding, 6)).await.unwrap();
        assert_eq!(results[0].id, "c1");
        assert!((results[0].score - 1.0).abs() < 1e-5);
        assert_eq!(
            results[0].metadata.as_ref().and_then(|m| m.url.as_deref()),
            Some("https://x")
        );
    }

    #[tokio::test]
    async fn query_respects_top_k_and_orders_descending() {
        let (_tmp, store) = test_store().await;
        store
            .upsert(vec![
                (make_chunk("low", "a", None), vec![0.1, 1.0]),
                (make_chunk("high", "b", None), vec![1.0, 0.0]),
                (make_chunk("mid", "c", None), vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = store.query(&query(vec![1.0, 0.0], 2)).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid"]);
    }

    #[tokio::test]
    async fn negative_similarity_is_clamped_to_zero() {
        let (_tmp, store) = test_store().await;
        store
            .upsert(vec![(make_chunk("opposite", "a", None), vec![-1.0, 0.0])])
            .await
            .unwrap();

        let results = store.query(&query(vec![1.0, 0.0], 1)).await.unwrap();
        assert_eq!(results[0].score, 0.0);
    }

    #[tokio::test]
    async fn metadata_is_omitted_unless_requested() {
        let (_tmp, store) = test_store().await;
        store
            .upsert(vec![(make_chunk("c1", "a", Some("https://x")), vec![1.0])])
            .await
            .unwrap();

        let request = QueryRequest {
            vector: vec![1.0],
            top_k: 1,
            include_metadata: false,
        };
        let results = store.query(&request).await.unwrap();
        assert!(results[0].metadata.is_none());
        assert_eq!(results[0].content, "a");
    }

    #[tokio::test]
    async fn upsert_rejects_empty_content_and_replaces_by_id() {
        let (_tmp, store) = test_store().await;

        let err = store
            .upsert(vec![(make_chunk("c1", "  ", None), vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(store.count().await.unwrap(), 0);

        store
            .upsert(vec![(make_chunk("c1", "first", None), vec![1.0])])
            .await
            .unwrap();
        store
            .upsert(vec![(make_chunk("c1", "second", None), vec![1.0])])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        let results = store.query(&query(vec![1.0], 1)).await.unwrap();
        assert_eq!(results[0].content, "second");

        assert_eq!(store.clear().await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
