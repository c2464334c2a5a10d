//! In-process [`VectorStore`] for tests and store-less local runs.
//!
//! Records live in a `HashMap` keyed by id (last write wins). Queries are
//! brute-force cosine similarity over every stored vector.

use crate::traits::VectorStore;
use crate::{Embedding, StoreError, VectorMatch, VectorRecord};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), StoreError> {
        let mut stored = self.records.write();
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &Embedding,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, StoreError> {
        let stored = self.records.read();
        let mut matches: Vec<VectorMatch> = stored
            .values()
            .map(|record| VectorMatch {
                id: record.id.clone(),
                score: cosine_sim(&vector.values, &record.values.values) as f64,
                source_text: record.metadata.source_text.clone(),
            })
            .collect();

        matches.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.id.cmp(&right.id))
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn heartbeat(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
