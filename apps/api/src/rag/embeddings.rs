use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::llm_client::{EmbeddingModel, LlmError};

pub const BATCH_SIZE: usize = 50;
const BATCH_PAUSE: Duration = Duration::from_millis(100);

/// Dimension-checked access to an embedding provider.
#[derive(Clone)]
pub struct EmbeddingGenerator {
    model: Arc<dyn EmbeddingModel>,
    dimension: usize,
}

impl EmbeddingGenerator {
    pub fn new(model: Arc<dyn EmbeddingModel>, dimension: usize) -> Self {
        Self { model, dimension }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Blank text embeds to the zero vector without a provider call.
    pub async fn generate_single(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        if text.trim().is_empty() {
            warn!("Empty text provided for embedding");
            return Ok(vec![0.0; self.dimension]);
        }

        let embedding = self
            .model
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyContent)?;

        if embedding.len() != self.dimension {
            warn!(
                "Embedding dimension mismatch: got {}, expected {}",
                embedding.len(),
                self.dimension
            );
        }
        Ok(embedding)
    }

    pub async fn generate_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches = texts.len().div_ceil(BATCH_SIZE);
        let mut all = Vec::with_capacity(texts.len());

        for (n, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            info!("Embedding batch {}/{} ({} texts)", n + 1, batches, batch.len());
            let started = Instant::now();

            let embeddings = self.model.embed(batch).await?;
            for (j, embedding) in embeddings.iter().enumerate() {
                if embedding.len() != self.dimension {
                    warn!(
                        "Embedding dimension mismatch for item {}: got {}, expected {}",
                        n * BATCH_SIZE + j,
                        embedding.len(),
                        self.dimension
                    );
                }
            }
            all.extend(embeddings);
            debug!("Batch embedded in {:.2}s", started.elapsed().as_secs_f64());

            if n + 1 < batches {
                tokio::time::sleep(BATCH_PAUSE).await;
            }
        }

        info!("Generated {} embeddings", all.len());
        Ok(all)
    }
}
