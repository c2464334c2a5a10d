use crate::providers::sse::SseDecoder;
use crate::traits::{CompletionProvider, EmbeddingProvider, TextStream};
use crate::{Embedding, ProviderError, TaskType};
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::fmt::Display;
use url::Url;

const PROVIDER: &str = "gemini";

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub dimensions: usize,
}

/// Google Generative Language API client serving both embeddings and completions.
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Embedding>,
}

impl GeminiClient {
    pub fn new(mut config: GeminiConfig) -> Result<Self, ProviderError> {
        Url::parse(&config.base_url)?;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self {
            config,
            client: Client::new(),
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.config.base_url, model, method)
    }

    fn post(&self, url: String) -> RequestBuilder {
        self.client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
    }
}

async fn error_from_response(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    ProviderError::BackendResponse {
        provider: PROVIDER.to_string(),
        details: format!("{status}: {body}"),
    }
}

fn batch_embed_body(model: &str, texts: &[String], task: TaskType) -> Value {
    let requests: Vec<Value> = texts
        .iter()
        .map(|text| {
            json!({
                "model": format!("models/{model}"),
                "content": { "parts": [{ "text": text }] },
                "taskType": task.as_api_str(),
            })
        })
        .collect();
    json!({ "requests": requests })
}

fn generate_body(prompt: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }]
        }]
    })
}

/// Concatenated text parts of the first candidate, `None` when it has none.
fn candidate_text(response: &Value) -> Option<String> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn fragment_from_payload(payload: &str) -> Result<Option<String>, ProviderError> {
    let value: Value = serde_json::from_str(payload)?;
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(ProviderError::Stream(message));
    }
    Ok(candidate_text(&value))
}

struct FragmentState<S> {
    bytes: S,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Turns an SSE byte stream of generate-content responses into text fragments.
/// The first error ends the stream.
pub fn decode_fragments<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]>,
    E: Display,
{
    let state = FragmentState {
        bytes,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(payload) = state.pending.pop_front() {
                match fragment_from_payload(&payload) {
                    Ok(Some(text)) => return Some((Ok(text), state)),
                    Ok(None) => continue,
                    Err(error) => {
                        state.pending.clear();
                        state.finished = true;
                        return Some((Err(error), state));
                    }
                }
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(chunk.as_ref());
                    state.pending.extend(events);
                }
                Some(Err(error)) => {
                    state.finished = true;
                    return Some((Err(ProviderError::Stream(error.to_string())), state));
                }
                None => {
                    state.finished = true;
                    let last = state.decoder.finish();
                    state.pending.extend(last);
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl EmbeddingProvider for GeminiClient {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        task: TaskType,
    ) -> Result<Vec<Embedding>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = &self.config.embedding_model;
        let response = self
            .post(self.model_url(model, "batchEmbedContents"))
            .json(&batch_embed_body(model, texts, task))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let parsed: BatchEmbedResponse = response.json().await?;
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl CompletionProvider for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let response = self
            .post(self.model_url(&self.config.chat_model, "generateContent"))
            .json(&generate_body(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let parsed: Value = response.json().await?;
        candidate_text(&parsed).ok_or(ProviderError::EmptyResponse)
    }

    async fn complete_stream(&self, prompt: &str) -> Result<TextStream, ProviderError> {
        let url = format!(
            "{}?alt=sse",
            self.model_url(&self.config.chat_model, "streamGenerateContent")
        );
        let response = self.post(url).json(&generate_body(prompt)).send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(decode_fragments(response.bytes_stream()))
    }
}
