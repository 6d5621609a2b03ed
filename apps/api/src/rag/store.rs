use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use tracing::{info, warn};

use crate::rag::{Chunk, RawDocument};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("chunk {0} has no embedding")]
    MissingEmbedding(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, FromRow)]
struct RawRow {
    id: String,
    content: String,
    metadata: Json<Value>,
}

#[derive(Debug, FromRow)]
struct ChunkRow {
    chunk_id: String,
    content: String,
    parent_content: Option<String>,
    strategy: String,
    metadata: Json<Value>,
    embedding: Option<Json<Vec<f32>>>,
}

/// A stored chunk ranked against a query embedding.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub content: String,
    pub parent_content: Option<String>,
    pub strategy: String,
    pub metadata: Value,
    pub similarity_score: f32,
}

impl ScoredChunk {
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub raw_documents: i64,
    pub total_chunks: i64,
    pub chunks_with_embeddings: i64,
    pub embedding_dimension: usize,
    pub strategy_distribution: BTreeMap<String, i64>,
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Raw documents and embedded chunks, both in SQLite.
#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces by id. Returns the number written.
    pub async fn store_documents(&self, documents: &[RawDocument]) -> Result<usize, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for document in documents {
            sqlx::query("INSERT OR REPLACE INTO documents_raw (id, content, metadata) VALUES (?, ?, ?)")
                .bind(&document.id)
                .bind(&document.content)
                .bind(Json(&document.metadata))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!("Stored {} raw documents", documents.len());
        Ok(documents.len())
    }

    pub async fn get_all_documents(&self, limit: Option<i64>) -> Result<Vec<RawDocument>, sqlx::Error> {
        let rows: Vec<RawRow> = sqlx::query_as(
            "SELECT id, content, metadata FROM documents_raw ORDER BY created_at, id LIMIT ?",
        )
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| RawDocument {
                id: row.id,
                content: row.content,
                metadata: row.metadata.0,
            })
            .collect())
    }

    pub async fn clear_raw(&self) -> Result<u64, sqlx::Error> {
        let deleted = sqlx::query("DELETE FROM documents_raw")
            .execute(&self.pool)
            .await?
            .rows_affected();
        warn!("Cleared {deleted} raw documents");
        Ok(deleted)
    }

    /// Every chunk must already carry its embedding; nothing is written otherwise.
    pub async fn store_chunks(&self, chunks: &[Chunk]) -> Result<usize, StoreError> {
        if let Some(missing) = chunks.iter().find(|c| c.embedding.is_none()) {
            return Err(StoreError::MissingEmbedding(missing.chunk_id.clone()));
        }

        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO documents_rag
                    (chunk_id, content, parent_content, strategy, metadata, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.content)
            .bind(&chunk.parent_content)
            .bind(chunk.strategy.as_str())
            .bind(Json(&chunk.metadata))
            .bind(chunk.embedding.as_ref().map(Json))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!("Stored {} chunks in vector store", chunks.len());
        Ok(chunks.len())
    }

    pub async fn clear_chunks(&self) -> Result<u64, sqlx::Error> {
        let deleted = sqlx::query("DELETE FROM documents_rag")
            .execute(&self.pool)
            .await?
            .rows_affected();
        warn!("Cleared {deleted} chunks from vector store");
        Ok(deleted)
    }

    pub async fn stats(&self) -> Result<StoreStats, sqlx::Error> {
        let raw_documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents_raw")
            .fetch_one(&self.pool)
            .await?;
        let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents_rag")
            .fetch_one(&self.pool)
            .await?;
        let chunks_with_embeddings: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents_rag WHERE embedding IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;

        let sample: Option<Json<Vec<f32>>> =
            sqlx::query_scalar("SELECT embedding FROM documents_rag WHERE embedding IS NOT NULL LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        let distribution: Vec<(String, i64)> =
            sqlx::query_as("SELECT strategy, COUNT(*) FROM documents_rag GROUP BY strategy")
                .fetch_all(&self.pool)
                .await?;

        Ok(StoreStats {
            raw_documents,
            total_chunks,
            chunks_with_embeddings,
            embedding_dimension: sample.map(|e| e.0.len()).unwrap_or(0),
            strategy_distribution: distribution.into_iter().collect(),
        })
    }

    /// Brute-force cosine scan over every embedded chunk.
    pub async fn search_similar(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, sqlx::Error> {
        let rows: Vec<ChunkRow> = sqlx::query_as(
            r#"
            SELECT chunk_id, content, parent_content, strategy, metadata, embedding
            FROM documents_rag
            WHERE embedding IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<ScoredChunk> = rows
            .into_iter()
            .filter_map(|row| {
                let embedding = row.embedding?.0;
                Some(ScoredChunk {
                    similarity_score: cosine_similarity(query, &embedding),
                    chunk_id: row.chunk_id,
                    content: row.content,
                    parent_content: row.parent_content,
                    strategy: row.strategy,
                    metadata: row.metadata.0,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
pub fn embedded_chunk(id: &str, content: &str, embedding: Vec<f32>) -> Chunk {
    Chunk {
        chunk_id: id.to_string(),
        content: content.to_string(),
        parent_content: None,
        strategy: crate::rag::ChunkingStrategy::Simple,
        metadata: serde_json::json!({"title": format!("Tài liệu {id}")}),
        embedding: Some(embedding),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::test_pool;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_raw_documents_round_trip() {
        let store = DocumentStore::new(test_pool().await);
        let document = RawDocument {
            id: "abc".to_string(),
            content: "Nội dung".to_string(),
            metadata: json!({"title": "Sổ tay"}),
        };
        store.store_documents(&[document.clone()]).await.unwrap();
        store.store_documents(&[document.clone()]).await.unwrap();

        assert_eq!(store.get_all_documents(None).await.unwrap(), vec![document]);
        assert_eq!(store.clear_raw().await.unwrap(), 1);
        assert!(store.get_all_documents(Some(10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_chunks_requires_embeddings() {
        let store = DocumentStore::new(test_pool().await);
        let mut chunk = embedded_chunk("c1", "text", vec![1.0, 0.0]);
        chunk.embedding = None;

        let err = store.store_chunks(&[chunk]).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingEmbedding(id) if id == "c1"));
        assert_eq!(store.stats().await.unwrap().total_chunks, 0);
    }

    #[tokio::test]
    async fn test_search_ranks_by_cosine() {
        let store = DocumentStore::new(test_pool().await);
        store
            .store_chunks(&[
                embedded_chunk("far", "xa", vec![0.0, 1.0, 0.0]),
                embedded_chunk("near", "gần", vec![0.9, 0.1, 0.0]),
                embedded_chunk("exact", "đúng", vec![1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.search_similar(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, "exact");
        assert_eq!(results[1].chunk_id, "near");
        assert!(results[0].similarity_score > results[1].similarity_score);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.chunks_with_embeddings, 3);
        assert_eq!(stats.embedding_dimension, 3);
        assert_eq!(stats.strategy_distribution.get("simple"), Some(&3));

        assert_eq!(store.clear_chunks().await.unwrap(), 3);
    }
}
