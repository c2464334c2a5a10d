use crate::prompt::build_augmented_prompt;
use crate::query::QueryTransformer;
use crate::retriever::Retriever;
use crate::traits::{CompletionProvider, EmbeddingProvider, TextStream, VectorStore};
use crate::{ChatError, ConversationTurn, ProviderError, RetrievalOptions};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Written once between the sources header and the answer fragments.
pub const STREAM_SEPARATOR: &str = "\n--STREAM_SEPARATOR--\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStage {
    Received,
    TransformingQuery,
    Embedding,
    Retrieving,
    Streaming,
    Complete,
    Failed,
}

impl fmt::Display for ChatStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChatStage::Received => "received",
            ChatStage::TransformingQuery => "transforming_query",
            ChatStage::Embedding => "embedding",
            ChatStage::Retrieving => "retrieving",
            ChatStage::Streaming => "streaming",
            ChatStage::Complete => "complete",
            ChatStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Serialize)]
struct SourcesHeader<'a> {
    sources: &'a [String],
}

/// Retrieved sources plus the not-yet-consumed answer stream.
pub struct QueryResult {
    pub sources: Vec<String>,
    pub stream: TextStream,
}

impl QueryResult {
    /// The `{"sources":[..]}` header, then the separator.
    pub fn header(&self) -> Result<String, ProviderError> {
        let json = serde_json::to_string(&SourcesHeader {
            sources: &self.sources,
        })?;
        Ok(format!("{json}{STREAM_SEPARATOR}"))
    }

    /// Response body: header first, then every fragment as it arrives. The
    /// first fragment error is yielded and ends the body.
    pub fn into_body(
        self,
    ) -> Result<BoxStream<'static, Result<Bytes, ProviderError>>, ProviderError> {
        let header = self.header()?;
        let initial = (self.stream, false);
        let fragments = stream::unfold(initial, |(mut fragments, failed)| async move {
            if failed {
                return None;
            }
            match fragments.next().await {
                Some(Ok(text)) => Some((Ok(Bytes::from(text)), (fragments, false))),
                Some(Err(error)) => {
                    warn!(%error, "answer stream failed mid-response");
                    debug!(stage = %ChatStage::Failed, "chat");
                    Some((Err(error), (fragments, true)))
                }
                None => {
                    debug!(stage = %ChatStage::Complete, "chat");
                    None
                }
            }
        });

        Ok(stream::once(async move { Ok(Bytes::from(header)) })
            .chain(fragments)
            .boxed())
    }
}

/// Per-query flow: rewrite, embed, retrieve, augment, stream.
pub struct ChatService<E: ?Sized, C: ?Sized, S: ?Sized> {
    transformer: QueryTransformer<C>,
    retriever: Retriever<E, S>,
    completion: Arc<C>,
}

impl<E, C, S> ChatService<E, C, S>
where
    E: EmbeddingProvider + ?Sized,
    C: CompletionProvider + ?Sized,
    S: VectorStore + ?Sized,
{
    pub fn new(embedder: Arc<E>, completion: Arc<C>, store: Arc<S>) -> Self {
        Self {
            transformer: QueryTransformer::new(Arc::clone(&completion)),
            retriever: Retriever::new(embedder, store),
            completion,
        }
    }

    pub fn with_options(mut self, options: RetrievalOptions) -> Self {
        self.retriever = self.retriever.with_options(options);
        self
    }

    pub async fn process_query(
        &self,
        query: &str,
        history: &[ConversationTurn],
    ) -> Result<QueryResult, ChatError> {
        debug!(stage = %ChatStage::Received, history_turns = history.len(), "chat");
        if query.trim().is_empty() {
            debug!(stage = %ChatStage::Failed, "chat");
            return Err(ChatError::Validation("query must not be empty".to_string()));
        }

        debug!(stage = %ChatStage::TransformingQuery, "chat");
        let search_query = self.transformer.transform(query, history).await;

        debug!(stage = %ChatStage::Embedding, "chat");
        let embedding = self
            .retriever
            .embed_query(&search_query)
            .await
            .map_err(|error| {
                debug!(stage = %ChatStage::Failed, "chat");
                ChatError::Embedding(error)
            })?;

        debug!(stage = %ChatStage::Retrieving, "chat");
        let sources = self.retriever.search(&embedding).await;

        let prompt = build_augmented_prompt(query, &sources, history);
        debug!(stage = %ChatStage::Streaming, sources = sources.len(), "chat");
        let stream = self
            .completion
            .complete_stream(&prompt)
            .await
            .map_err(|error| {
                debug!(stage = %ChatStage::Failed, "chat");
                ChatError::Completion(error)
            })?;

        Ok(QueryResult { sources, stream })
    }

    /// Runs the whole flow and collects the answer, for non-streaming callers.
    pub async fn answer(
        &self,
        query: &str,
        history: &[ConversationTurn],
    ) -> Result<(Vec<String>, String), ChatError> {
        let QueryResult {
            sources,
            mut stream,
        } = self.process_query(query, history).await?;

        let mut answer = String::new();
        while let Some(fragment) = stream.next().await {
            answer.push_str(&fragment.map_err(|error| {
                debug!(stage = %ChatStage::Failed, "chat");
                ChatError::Completion(error)
            })?);
        }
        debug!(stage = %ChatStage::Complete, "chat");
        Ok((sources, answer))
    }
}
