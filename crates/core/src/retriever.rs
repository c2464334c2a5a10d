use crate::embeddings::EmbeddingBatcher;
use crate::traits::{EmbeddingProvider, VectorStore};
use crate::{Embedding, ProviderError, RetrievalOptions};
use std::sync::Arc;
use tracing::warn;

pub struct Retriever<E: ?Sized, S: ?Sized> {
    batcher: EmbeddingBatcher<E>,
    store: Arc<S>,
    top_k: usize,
}

impl<E, S> Retriever<E, S>
where
    E: EmbeddingProvider + ?Sized,
    S: VectorStore + ?Sized,
{
    pub fn new(embedder: Arc<E>, store: Arc<S>) -> Self {
        Self {
            batcher: EmbeddingBatcher::new(embedder),
            store,
            top_k: RetrievalOptions::default().top_k,
        }
    }

    pub fn with_options(mut self, options: RetrievalOptions) -> Self {
        self.top_k = options.top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn embed_query(&self, query: &str) -> Result<Embedding, ProviderError> {
        self.batcher.embed_query(query).await
    }

    /// Source texts of the nearest stored chunks. A failing store degrades
    /// to an empty list.
    pub async fn search(&self, embedding: &Embedding) -> Vec<String> {
        match self.store.query(embedding, self.top_k).await {
            Ok(matches) => matches.into_iter().map(|hit| hit.source_text).collect(),
            Err(error) => {
                warn!(%error, "vector store query failed, answering without sources");
                Vec::new()
            }
        }
    }

    /// Embedding failures propagate; store failures do not.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<String>, ProviderError> {
        let embedding = self.embed_query(query).await?;
        Ok(self.search(&embedding).await)
    }
}
