use crate::traits::EmbeddingProvider;
use crate::{Embedding, ProviderError, TaskType};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 100;

/// Splits arbitrarily long inputs into provider-sized batches and stitches
/// the results back together in input order.
pub struct EmbeddingBatcher<E: ?Sized> {
    provider: Arc<E>,
    batch_size: usize,
}

impl<E: ?Sized> Clone for EmbeddingBatcher<E> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            batch_size: self.batch_size,
        }
    }
}

impl<E> EmbeddingBatcher<E>
where
    E: EmbeddingProvider + ?Sized,
{
    pub fn new(provider: Arc<E>) -> Self {
        Self {
            provider,
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Output index `i` always corresponds to `texts[i]`. The first failing
    /// batch aborts the whole call.
    pub async fn embed_all(
        &self,
        texts: &[String],
        task: TaskType,
    ) -> Result<Vec<Embedding>, ProviderError> {
        let mut all = Vec::with_capacity(texts.len());

        for (batch_index, batch) in texts.chunks(self.batch_size).enumerate() {
            let embeddings = self.provider.embed_batch(batch, task).await?;
            if embeddings.len() != batch.len() {
                return Err(ProviderError::BatchSizeMismatch {
                    requested: batch.len(),
                    returned: embeddings.len(),
                });
            }
            all.extend(embeddings);
            debug!(
                batch = batch_index + 1,
                total = all.len(),
                task = task.as_api_str(),
                "embedding batch processed"
            );
        }

        Ok(all)
    }

    pub async fn embed_query(&self, text: &str) -> Result<Embedding, ProviderError> {
        self.embed_all(&[text.to_string()], TaskType::Query)
            .await?
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse)
    }
}

/// Offline embedder hashing character trigrams into a fixed number of buckets.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        _task: TaskType,
    ) -> Result<Vec<Embedding>, ProviderError> {
        Ok(texts
            .iter()
            .map(|text| Embedding::new(self.embed(text)))
            .collect())
    }
}
