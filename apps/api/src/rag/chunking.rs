use serde_json::{json, Value};
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::{info, warn};

use crate::rag::{Chunk, ChunkingStrategy, RawDocument};

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Splits on the coarsest boundary that fits (paragraph, line, sentence,
/// word, grapheme), packing pieces up to `capacity` chars and carrying up to
/// `overlap` chars into the next chunk. Chunks come back trimmed.
pub fn split_text(text: &str, capacity: usize, overlap: usize) -> Vec<String> {
    let capacity = capacity.max(1);
    let config = ChunkConfig::new(capacity)
        .with_overlap(overlap)
        .unwrap_or_else(|e| {
            warn!("Chunk overlap {overlap} rejected for capacity {capacity}: {e}");
            ChunkConfig::new(capacity)
        });

    TextSplitter::new(config)
        .chunks(text)
        .filter(|chunk| !chunk.trim().is_empty())
        .map(str::to_string)
        .collect()
}

fn with_fields(base: &Value, fields: Value) -> Value {
    let mut merged = base.as_object().cloned().unwrap_or_default();
    if let Value::Object(extra) = fields {
        merged.extend(extra);
    }
    Value::Object(merged)
}

/// Turns raw documents into chunks for one of the indexing strategies.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn chunk_documents(&self, documents: &[RawDocument], strategy: ChunkingStrategy) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for document in documents {
            if document.content.trim().is_empty() {
                warn!("Empty content in document {}", document.id);
                continue;
            }
            chunks.extend(match strategy {
                ChunkingStrategy::Simple => self.simple(document),
                ChunkingStrategy::Contextual => self.contextual(document),
                ChunkingStrategy::Parent => self.parent(document),
            });
        }
        info!(
            "Created {} chunks from {} documents using '{}' strategy",
            chunks.len(),
            documents.len(),
            strategy.as_str()
        );
        chunks
    }

    fn simple(&self, document: &RawDocument) -> Vec<Chunk> {
        let pieces = split_text(&document.content, self.chunk_size, self.chunk_overlap);
        let total = pieces.len();

        pieces
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                chunk_id: format!("{}_{i}", document.id),
                metadata: with_fields(
                    &document.metadata,
                    json!({
                        "parent_document_id": document.id,
                        "chunk_index": i,
                        "total_chunks": total,
                        "chunk_size": char_len(&text),
                        "word_count": text.split_whitespace().count(),
                    }),
                ),
                content: text,
                parent_content: None,
                strategy: ChunkingStrategy::Simple,
                embedding: None,
            })
            .collect()
    }

    fn contextual(&self, document: &RawDocument) -> Vec<Chunk> {
        let mut chunks = self.simple(document);
        for chunk in &mut chunks {
            chunk.strategy = ChunkingStrategy::Contextual;
            if let Some(title) = document.title() {
                chunk.content = format!("Document: {title}\n\n{}", chunk.content);
            }
        }
        chunks
    }

    fn parent(&self, document: &RawDocument) -> Vec<Chunk> {
        let parents = split_text(&document.content, self.chunk_size * 2, self.chunk_overlap);

        let mut chunks = Vec::new();
        for (i, parent) in parents.into_iter().enumerate() {
            let children = split_text(&parent, self.chunk_size / 2, self.chunk_overlap / 2);
            for (j, child) in children.into_iter().enumerate() {
                chunks.push(Chunk {
                    chunk_id: format!("{}_{i}_{j}", document.id),
                    metadata: with_fields(
                        &document.metadata,
                        json!({
                            "parent_document_id": document.id,
                            "parent_chunk_id": format!("{}_{i}", document.id),
                            "parent_index": i,
                            "chunk_index": j,
                            "chunk_size": char_len(&child),
                            "parent_size": char_len(&parent),
                            "word_count": child.split_whitespace().count(),
                        }),
                    ),
                    content: child,
                    parent_content: Some(parent.clone()),
                    strategy: ChunkingStrategy::Parent,
                    embedding: None,
                });
            }
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str) -> RawDocument {
        RawDocument {
            id: "doc1".to_string(),
            content: content.to_string(),
            metadata: json!({"title": "Hướng nghiệp", "source": "/data/a.pdf"}),
        }
    }

    #[test]
    fn test_split_packs_words_up_to_capacity() {
        assert_eq!(split_text("aaaa bbbb cccc", 10, 0), vec!["aaaa bbbb", "cccc"]);
        assert!(split_text("   ", 10, 0).is_empty());
    }

    #[test]
    fn test_split_carries_overlap() {
        let chunks = split_text("aa bb cc dd ee ff gg", 10, 5);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        let first_word = chunks[1].split_whitespace().next().unwrap();
        assert!(chunks[0].contains(first_word));
    }

    #[test]
    fn test_split_prefers_paragraphs() {
        assert_eq!(
            split_text("para one\n\npara two", 10, 0),
            vec!["para one", "para two"]
        );
    }

    #[test]
    fn test_split_counts_chars_not_bytes() {
        let chunks = split_text("nghề nghiệp tương lai", 10, 0);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn test_oversized_overlap_falls_back_to_plain_chunks() {
        let chunks = split_text("aaaa bbbb cccc", 10, 50);
        assert_eq!(chunks, vec!["aaaa bbbb", "cccc"]);
    }

    #[test]
    fn test_simple_and_contextual_chunks() {
        let chunker = Chunker::new(10, 0);
        let document = doc("aaaa bbbb cccc");

        let simple = chunker.chunk_documents(std::slice::from_ref(&document), ChunkingStrategy::Simple);
        assert_eq!(simple.len(), 2);
        assert_eq!(simple[1].chunk_id, "doc1_1");
        assert_eq!(simple[1].metadata["total_chunks"], 2);
        assert_eq!(simple[0].metadata["word_count"], 2);
        assert_eq!(simple[0].metadata["source"], "/data/a.pdf");

        let contextual = chunker.chunk_documents(&[document], ChunkingStrategy::Contextual);
        assert_eq!(contextual[0].content, "Document: Hướng nghiệp\n\naaaa bbbb");
        assert_eq!(contextual[0].strategy, ChunkingStrategy::Contextual);
    }

    #[test]
    fn test_parent_chunks_keep_parent_content() {
        let chunker = Chunker::new(10, 0);
        let chunks = chunker.chunk_documents(&[doc("aaaa bbbb cccc dddd")], ChunkingStrategy::Parent);

        assert_eq!(chunks[0].chunk_id, "doc1_0_0");
        assert_eq!(chunks[0].metadata["parent_chunk_id"], "doc1_0");
        assert_eq!(chunks[0].parent_content.as_deref(), Some("aaaa bbbb cccc dddd"));
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 5));
    }

    #[test]
    fn test_empty_documents_are_skipped() {
        let chunker = Chunker::new(10, 0);
        assert!(chunker.chunk_documents(&[doc("   ")], ChunkingStrategy::Simple).is_empty());
    }
}
