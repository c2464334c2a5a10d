use crate::traits::VectorStore;
use crate::{Embedding, IngestError, RecordMetadata, TextChunk, VectorRecord};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_UPSERT_BATCH_SIZE: usize = 100;

static WRITE_RUNS: AtomicU64 = AtomicU64::new(0);

/// Produces `chunk_<unix millis>_<run>_<offset>` ids. `run` is unique per
/// process and per writer call, so two calls in the same millisecond never collide.
#[derive(Debug, Clone)]
pub struct RecordIdGenerator {
    prefix: String,
}

impl RecordIdGenerator {
    pub fn next_run() -> Self {
        let run = WRITE_RUNS.fetch_add(1, Ordering::Relaxed);
        Self {
            prefix: format!("chunk_{}_{}", Utc::now().timestamp_millis(), run),
        }
    }

    pub fn id_for(&self, offset: usize) -> String {
        format!("{}_{}", self.prefix, offset)
    }
}

pub fn build_records(chunks: &[TextChunk], embeddings: Vec<Embedding>) -> Vec<VectorRecord> {
    let ids = RecordIdGenerator::next_run();
    chunks
        .iter()
        .zip(embeddings)
        .enumerate()
        .map(|(offset, (chunk, values))| VectorRecord {
            id: ids.id_for(offset),
            values,
            metadata: RecordMetadata {
                source_text: chunk.text.clone(),
            },
        })
        .collect()
}

pub struct VectorStoreWriter<S: ?Sized> {
    store: Arc<S>,
    batch_size: usize,
}

impl<S: ?Sized> Clone for VectorStoreWriter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            batch_size: self.batch_size,
        }
    }
}

impl<S> VectorStoreWriter<S>
where
    S: VectorStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            batch_size: DEFAULT_UPSERT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Upserts one record per chunk with freshly generated ids. Re-running on
    /// the same chunks stores duplicates; nothing is deduplicated by content.
    pub async fn write(
        &self,
        chunks: &[TextChunk],
        embeddings: Vec<Embedding>,
    ) -> Result<usize, IngestError> {
        if chunks.len() != embeddings.len() {
            return Err(IngestError::InvalidArgument(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let records = build_records(chunks, embeddings);
        for batch in records.chunks(self.batch_size) {
            self.store.upsert(batch).await?;
            debug!(batch_len = batch.len(), "upserted vector batch");
        }

        Ok(records.len())
    }
}
