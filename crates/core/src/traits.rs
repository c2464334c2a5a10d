use crate::{
    Embedding, ProviderError, StoreError, TaskType, VectorMatch, VectorRecord,
};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Forward-only sequence of answer fragments. Not restartable.
pub type TextStream = BoxStream<'static, Result<String, ProviderError>>;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimensions(&self) -> usize;

    /// Embeds one provider-sized batch. The i-th output belongs to the i-th input.
    async fn embed_batch(
        &self,
        texts: &[String],
        task: TaskType,
    ) -> Result<Vec<Embedding>, ProviderError>;
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    async fn complete_stream(&self, prompt: &str) -> Result<TextStream, ProviderError>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), StoreError>;

    async fn query(
        &self,
        vector: &Embedding,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, StoreError>;

    async fn heartbeat(&self) -> Result<(), StoreError>;
}
