//! Retrieval-augmented career counseling: offline PDF ingestion and
//! indexing, plus the online agent that answers questions from the index.

pub mod agent;
pub mod chunking;
pub mod embeddings;
pub mod handlers;
pub mod ingest;
pub mod pdf;
pub mod prompts;
pub mod store;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A whole source document before chunking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawDocument {
    pub id: String,
    pub content: String,
    pub metadata: Value,
}

impl RawDocument {
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(Value::as_str)
    }
}

/// An indexed piece of a document. `embedding` is filled before storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub content: String,
    pub parent_content: Option<String>,
    pub strategy: ChunkingStrategy,
    pub metadata: Value,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    Simple,
    Contextual,
    Parent,
}

impl ChunkingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingStrategy::Simple => "simple",
            ChunkingStrategy::Contextual => "contextual",
            ChunkingStrategy::Parent => "parent",
        }
    }
}

impl std::str::FromStr for ChunkingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(ChunkingStrategy::Simple),
            "contextual" => Ok(ChunkingStrategy::Contextual),
            "parent" => Ok(ChunkingStrategy::Parent),
            other => Err(format!("Unknown chunking strategy: {other}")),
        }
    }
}
