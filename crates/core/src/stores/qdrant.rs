use crate::traits::VectorStore;
use crate::{Embedding, StoreError, VectorMatch, VectorRecord};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use url::Url;
use uuid::Uuid;

const BACKEND: &str = "qdrant";

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
    api_key: Option<String>,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Result<Self, StoreError> {
        let endpoint = endpoint.into();
        Url::parse(&endpoint)?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    /// Creates the collection with cosine distance when it does not exist yet.
    pub async fn ensure_collection(&self) -> Result<(), StoreError> {
        let response = self
            .authorized(self.client.get(self.collection_url()))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                let created = self
                    .authorized(self.client.put(self.collection_url()))
                    .json(&json!({
                        "vectors": { "size": self.vector_size, "distance": "Cosine" }
                    }))
                    .send()
                    .await?;
                ensure_success(created.status())
            }
            status if status.is_success() => {
                let body: Value = response.json().await?;
                match existing_vector_size(&body) {
                    Some(size) if size != self.vector_size => Err(StoreError::Request(format!(
                        "collection {} has vector size {} but {} is configured",
                        self.collection, size, self.vector_size
                    ))),
                    _ => Ok(()),
                }
            }
            status => ensure_success(status),
        }
    }
}

fn ensure_success(status: StatusCode) -> Result<(), StoreError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(StoreError::BackendResponse {
            backend: BACKEND.to_string(),
            details: status.to_string(),
        })
    }
}

fn existing_vector_size(body: &Value) -> Option<usize> {
    body.pointer("/result/config/params/vectors/size")
        .and_then(Value::as_u64)
        .map(|size| size as usize)
}

/// Qdrant only accepts integer or UUID point ids, so record ids map to a stable UUIDv5.
pub fn point_id(record_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, record_id.as_bytes())
}

fn to_points(records: &[VectorRecord], vector_size: usize) -> Result<Vec<Value>, StoreError> {
    records
        .iter()
        .map(|record| {
            if record.values.dimensions() != vector_size {
                return Err(StoreError::Request(format!(
                    "embedding dimension {} != {}",
                    record.values.dimensions(),
                    vector_size
                )));
            }

            Ok(json!({
                "id": point_id(&record.id).to_string(),
                "vector": record.values.values,
                "payload": {
                    "record_id": record.id,
                    "source_text": record.metadata.source_text,
                },
            }))
        })
        .collect()
}

fn parse_matches(parsed: &Value) -> Vec<VectorMatch> {
    parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| VectorMatch {
                    id: hit
                        .pointer("/payload/record_id")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .or_else(|| {
                            hit.pointer("/id").map(|id| match id {
                                Value::String(id) => id.clone(),
                                other => other.to_string(),
                            })
                        })
                        .unwrap_or_default(),
                    score: hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0),
                    source_text: hit
                        .pointer("/payload/source_text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), StoreError> {
        let points = to_points(records, self.vector_size)?;
        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .authorized(
                self.client
                    .put(format!("{}/points?wait=true", self.collection_url())),
            )
            .json(&json!({ "points": points }))
            .send()
            .await?;

        ensure_success(response.status())
    }

    async fn query(
        &self,
        vector: &Embedding,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, StoreError> {
        if vector.dimensions() != self.vector_size {
            return Err(StoreError::Request(format!(
                "query vector dim {} is not {}",
                vector.dimensions(),
                self.vector_size
            )));
        }

        let response = self
            .authorized(
                self.client
                    .post(format!("{}/points/search", self.collection_url())),
            )
            .json(&json!({
                "vector": vector.values,
                "limit": top_k,
                "with_payload": true,
            }))
            .send()
            .await?;

        ensure_success(response.status())?;
        let parsed: Value = response.json().await?;
        Ok(parse_matches(&parsed))
    }

    async fn heartbeat(&self) -> Result<(), StoreError> {
        let response = self
            .authorized(self.client.get(format!("{}/healthz", self.endpoint)))
            .send()
            .await
            .map_err(|error| StoreError::NotReady(error.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::NotReady(format!(
                "{} answered {}",
                self.endpoint,
                response.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordMetadata;

    fn record(id: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values: Embedding::new(values),
            metadata: RecordMetadata {
                source_text: format!("text of {id}"),
            },
        }
    }

    #[test]
    fn point_ids_are_stable_and_distinct() {
        assert_eq!(point_id("chunk_1_0_0"), point_id("chunk_1_0_0"));
        assert_ne!(point_id("chunk_1_0_0"), point_id("chunk_1_0_1"));
    }

    #[test]
    fn points_carry_record_id_and_source_text() -> Result<(), StoreError> {
        let points = to_points(&[record("chunk_9_1_3", vec![0.5, 0.5])], 2)?;

        assert_eq!(points[0]["payload"]["record_id"], "chunk_9_1_3");
        assert_eq!(points[0]["payload"]["source_text"], "text of chunk_9_1_3");
        assert_eq!(points[0]["id"], point_id("chunk_9_1_3").to_string());
        Ok(())
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let result = to_points(&[record("a", vec![1.0])], 3);
        assert!(matches!(result, Err(StoreError::Request(_))));
    }

    #[test]
    fn search_response_is_projected_in_rank_order() {
        let body = json!({
            "result": [
                {
                    "id": "u1",
                    "score": 0.91,
                    "payload": { "record_id": "chunk_a", "source_text": "first" }
                },
                { "id": "u2", "score": 0.42, "payload": { "source_text": "second" } }
            ],
            "status": "ok"
        });

        let matches = parse_matches(&body);

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "chunk_a");
        assert_eq!(matches[0].source_text, "first");
        assert_eq!(matches[1].id, "u2");
        assert_eq!(matches[1].source_text, "second");
    }

    #[test]
    fn existing_collection_size_is_read_from_config() {
        let body = json!({
            "result": {
                "config": { "params": { "vectors": { "size": 768, "distance": "Cosine" } } }
            }
        });
        assert_eq!(existing_vector_size(&body), Some(768));
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        assert!(QdrantStore::new("not a url", "docs", 768).is_err());
    }
}
