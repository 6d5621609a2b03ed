//! Offline pipeline: PDFs → raw documents → embedded chunks.

use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info};

use crate::rag::chunking::Chunker;
use crate::rag::embeddings::{EmbeddingGenerator, BATCH_SIZE};
use crate::rag::pdf::{find_pdfs, PdfProcessor};
use crate::rag::store::DocumentStore;
use crate::rag::ChunkingStrategy;

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub processed_files: usize,
    pub total_documents: usize,
    pub errors: usize,
    pub execution_time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub total_documents: usize,
    pub total_chunks: usize,
    pub embeddings_created: usize,
    pub strategy: ChunkingStrategy,
    pub execution_time: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    pub raw_deleted: u64,
    pub chunks_deleted: u64,
}

/// Processes every PDF under `root`. A file that fails is logged and skipped.
pub async fn ingest(
    root: &Path,
    processor: &PdfProcessor,
    store: &DocumentStore,
) -> anyhow::Result<IngestReport> {
    let started = Instant::now();
    let files = find_pdfs(root).await?;
    info!("Found {} PDF files under {}", files.len(), root.display());

    let mut documents = Vec::new();
    let mut processed_files = 0;
    let mut errors = 0;

    for file in &files {
        match processor.process(file).await {
            Ok(document) => {
                processed_files += 1;
                documents.extend(document);
            }
            Err(e) => {
                error!("Failed to process {}: {e:#}", file.display());
                errors += 1;
            }
        }
    }

    if !documents.is_empty() {
        store.store_documents(&documents).await?;
    }

    let report = IngestReport {
        processed_files,
        total_documents: documents.len(),
        errors,
        execution_time: started.elapsed().as_secs_f64(),
    };
    info!(
        "Ingest finished: {} files, {} documents, {} errors in {:.2}s",
        report.processed_files, report.total_documents, report.errors, report.execution_time
    );
    Ok(report)
}

/// Rebuilds the chunk index from scratch with `strategy`.
pub async fn build_index(
    store: &DocumentStore,
    generator: &EmbeddingGenerator,
    chunker: &Chunker,
    strategy: ChunkingStrategy,
) -> anyhow::Result<IndexReport> {
    let started = Instant::now();

    store.clear_chunks().await?;
    let documents = store.get_all_documents(None).await?;
    info!("Loaded {} raw documents", documents.len());

    let chunks = chunker.chunk_documents(&documents, strategy);
    let mut embeddings_created = 0;

    for batch in chunks.chunks(BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let embeddings = generator.generate_batch(&texts).await?;

        let embedded: Vec<_> = batch
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(mut chunk, embedding)| {
                chunk.embedding = Some(embedding);
                chunk
            })
            .collect();

        embeddings_created += embedded.len();
        store.store_chunks(&embedded).await?;
    }

    let report = IndexReport {
        total_documents: documents.len(),
        total_chunks: chunks.len(),
        embeddings_created,
        strategy,
        execution_time: started.elapsed().as_secs_f64(),
    };
    info!(
        "Index built: {} chunks from {} documents in {:.2}s",
        report.total_chunks, report.total_documents, report.execution_time
    );
    Ok(report)
}

pub async fn clean(store: &DocumentStore, raw: bool, chunks: bool) -> anyhow::Result<CleanReport> {
    let mut report = CleanReport::default();
    if raw {
        report.raw_deleted = store.clear_raw().await?;
    }
    if chunks {
        report.chunks_deleted = store.clear_chunks().await?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::config::Config;
    use crate::db::test_pool;
    use crate::llm_client::testing::FixedEmbeddings;
    use crate::rag::RawDocument;

    fn generator() -> EmbeddingGenerator {
        EmbeddingGenerator::new(Arc::new(FixedEmbeddings::new(Some(vec![1.0, 0.0, 0.0]))), 3)
    }

    async fn seeded_store() -> DocumentStore {
        let store = DocumentStore::new(test_pool().await);
        store
            .store_documents(&[
                RawDocument {
                    id: "d1".into(),
                    content: "aaaa bbbb cccc".into(),
                    metadata: json!({"title": "Một"}),
                },
                RawDocument {
                    id: "d2".into(),
                    content: "   ".into(),
                    metadata: json!({}),
                },
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_build_index_replaces_chunks() {
        let store = seeded_store().await;
        let chunker = Chunker::new(10, 0);

        let first = build_index(&store, &generator(), &chunker, ChunkingStrategy::Simple)
            .await
            .unwrap();
        assert_eq!(first.total_documents, 2);
        assert_eq!(first.total_chunks, 2);
        assert_eq!(first.embeddings_created, 2);

        let second = build_index(&store, &generator(), &chunker, ChunkingStrategy::Parent)
            .await
            .unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_chunks as usize, second.total_chunks);
        assert_eq!(stats.strategy_distribution.len(), 1);
        assert!(stats.strategy_distribution.contains_key("parent"));
    }

    #[tokio::test]
    async fn test_clean_selected_collections() {
        let store = seeded_store().await;
        build_index(&store, &generator(), &Chunker::new(10, 0), ChunkingStrategy::Simple)
            .await
            .unwrap();

        let report = clean(&store, false, true).await.unwrap();
        assert_eq!(report.chunks_deleted, 2);
        assert_eq!(report.raw_deleted, 0);
        assert_eq!(store.stats().await.unwrap().raw_documents, 2);
    }

    #[tokio::test]
    async fn test_ingest_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.pdf"), b"not a pdf").unwrap();

        let store = DocumentStore::new(test_pool().await);
        let processor = PdfProcessor::new(None, &Config::for_tests().rag);
        let report = ingest(dir.path(), &processor, &store).await.unwrap();

        assert_eq!(report.processed_files, 0);
        assert_eq!(report.errors, 1);
        assert_eq!(report.total_documents, 0);
    }
}
