//! HTTP surface of the chat service.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/upload` | Multipart `pdfs` upload, starts a background ingestion run |
//! | `GET`  | `/api/ingest-status` | SSE feed of ingestion progress, ends after `done` |
//! | `POST` | `/api/chat` | Streams `{"sources":[..]}`, the separator, then the answer |
//! | `GET`  | `/health` | Liveness and version |
//!
//! Errors are returned as `{ "error": "<message>" }`.

use axum::{
    body::Body,
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, State,
    },
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use pdf_chat_core::{
    ChatError, ChatService, CompletionProvider, ConversationTurn, Document, EmbeddingProvider,
    IngestionEvent, IngestionOptions, IngestionPipeline, ProgressChannel, RetrievalOptions,
    VectorStore,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const UPLOAD_FIELD: &str = "pdfs";
pub const DONE_MESSAGE: &str = "Ingestion finished.";

pub type Pipeline = IngestionPipeline<dyn EmbeddingProvider, dyn VectorStore>;
pub type Chat = ChatService<dyn EmbeddingProvider, dyn CompletionProvider, dyn VectorStore>;

/// Shared by every handler. One progress channel per process.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub chat: Arc<Chat>,
    pub progress: ProgressChannel,
}

impl AppState {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionProvider>,
        store: Arc<dyn VectorStore>,
        ingestion: &IngestionOptions,
        retrieval: RetrievalOptions,
    ) -> Self {
        let pipeline = IngestionPipeline::new(Arc::clone(&embedder), Arc::clone(&store))
            .with_options(ingestion);
        let chat = ChatService::new(embedder, completion, store).with_options(retrieval);
        Self {
            pipeline: Arc::new(pipeline),
            chat: Arc::new(chat),
            progress: ProgressChannel::new(),
        }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/ingest-status", get(handle_ingest_status))
        .route("/api/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(
    state: AppState,
    listen: SocketAddr,
    max_upload_bytes: usize,
) -> anyhow::Result<()> {
    let app = router(state, max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(%listen, "chat server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}

// ============ Error response ============

#[derive(Debug, Error)]
enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    Upload { status: StatusCode, message: String },

    #[error("An internal server error occurred.")]
    Internal,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Upload { status, .. } => *status,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(error: MultipartError) -> Self {
        AppError::Upload {
            status: error.status(),
            message: error.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::BadRequest(message.into())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/upload ============

#[derive(Serialize)]
struct UploadAccepted {
    message: String,
}

/// Buffers every `pdfs` part in memory, then hands the batch to a background
/// ingestion run and answers 202 right away.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadAccepted>), AppError> {
    let mut documents = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("upload-{}.pdf", documents.len() + 1));
        let bytes = field.bytes().await?;
        documents.push(Document::new(name, bytes.to_vec()));
    }

    if documents.is_empty() {
        return Err(bad_request("No files were uploaded."));
    }

    info!(files = documents.len(), "upload received, starting ingestion");
    let pipeline = Arc::clone(&state.pipeline);
    let progress = state.progress.clone();
    tokio::spawn(async move {
        let report = pipeline.run(documents, &progress).await;
        info!(
            processed = report.processed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            fatal = report.fatal.is_some(),
            "ingestion run finished"
        );
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadAccepted {
            message: "Upload received. Ingestion has started.".to_string(),
        }),
    ))
}

// ============ GET /api/ingest-status ============

fn to_sse_event(event: IngestionEvent) -> Event {
    match event {
        IngestionEvent::Log(line) => Event::default()
            .json_data(&line)
            .unwrap_or_else(|_| Event::default().data(line)),
        IngestionEvent::Done => Event::default().event("done").data(DONE_MESSAGE),
    }
}

async fn handle_ingest_status(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = state
        .progress
        .subscribe()
        .into_stream()
        .map(|event| Ok(to_sse_event(event)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    history: Vec<ConversationTurn>,
}

async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(rejection.body_text()).into_response(),
    };
    let Some(query) = request.query.filter(|query| !query.trim().is_empty()) else {
        return bad_request("The query field is required.").into_response();
    };

    info!(query = %query, history_turns = request.history.len(), "chat request");
    let result = match state.chat.process_query(&query, &request.history).await {
        Ok(result) => result,
        Err(ChatError::Validation(message)) => return bad_request(message).into_response(),
        Err(error) => {
            error!(%error, "chat request failed");
            return AppError::Internal.into_response();
        }
    };

    match result.into_body() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            Body::from_stream(body),
        )
            .into_response(),
        Err(error) => {
            error!(%error, "could not encode sources header");
            AppError::Internal.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use axum::http::Request;
    use futures::stream;
    use pdf_chat_core::traits::TextStream;
    use pdf_chat_core::{
        CharacterNgramEmbedder, Embedding, InMemoryStore, ProviderError, TaskType,
        STREAM_SEPARATOR,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    struct CountingEmbedder {
        inner: CharacterNgramEmbedder,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        fn dimensions(&self) -> usize {
            self.inner.dimensions
        }

        async fn embed_batch(
            &self,
            texts: &[String],
            task: TaskType,
        ) -> Result<Vec<Embedding>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed_batch(texts, task).await
        }
    }

    struct FixedAnswer;

    #[async_trait]
    impl CompletionProvider for FixedAnswer {
        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            Ok("standalone question".to_string())
        }

        async fn complete_stream(&self, _prompt: &str) -> Result<TextStream, ProviderError> {
            let fragments = vec![Ok("The pump ".to_string()), Ok("runs at 200 bar.".to_string())];
            Ok(stream::iter(fragments).boxed())
        }
    }

    fn test_state() -> (AppState, Arc<CountingEmbedder>) {
        let embedder = Arc::new(CountingEmbedder {
            inner: CharacterNgramEmbedder::new(32),
            calls: AtomicUsize::new(0),
        });
        let state = AppState::new(
            embedder.clone(),
            Arc::new(FixedAnswer),
            Arc::new(InMemoryStore::new()),
            &IngestionOptions::default(),
            RetrievalOptions::default(),
        );
        (state, embedder)
    }

    fn chat_request(body: &str) -> Request<Body> {
        Request::post("/api/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("valid chat request")
    }

    fn multipart_request(field: &str) -> Request<Body> {
        let boundary = "X-PDF-CHAT-BOUNDARY";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"manual.pdf\"\r\n\
             Content-Type: application/pdf\r\n\r\n\
             not really a pdf\r\n\
             --{boundary}--\r\n"
        );
        Request::post("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .expect("valid upload request")
    }

    async fn body_text(response: Response) -> Result<String, Box<dyn std::error::Error>> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    #[tokio::test]
    async fn health_reports_version() -> Result<(), Box<dyn std::error::Error>> {
        let (state, _) = test_state();
        let response = router(state, 1024)
            .oneshot(Request::get("/health").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await?)?;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        Ok(())
    }

    #[tokio::test]
    async fn chat_without_query_is_rejected_before_embedding(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (state, embedder) = test_state();
        let app = router(state, 1024);

        for body in [r#"{}"#, r#"{"query":null}"#, r#"{"query":"   "}"#, r#"{"query":"#] {
            let response = app.clone().oneshot(chat_request(body)).await?;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
        }
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn chat_streams_sources_then_answer() -> Result<(), Box<dyn std::error::Error>> {
        let (state, embedder) = test_state();
        let response = router(state, 1024)
            .oneshot(chat_request(r#"{"query":"What pressure?","history":[]}"#))
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok()),
            Some("text/plain; charset=utf-8")
        );
        let body = body_text(response).await?;
        assert_eq!(
            body,
            format!("{{\"sources\":[]}}{STREAM_SEPARATOR}The pump runs at 200 bar.")
        );
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn upload_without_pdfs_field_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let (state, _) = test_state();
        let progress = state.progress.clone();
        let response = router(state, 1024 * 1024)
            .oneshot(multipart_request("attachments"))
            .await?;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(progress.subscriber_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn upload_starts_a_run_that_ends_with_done() -> Result<(), Box<dyn std::error::Error>> {
        let (state, _) = test_state();
        let mut subscription = state.progress.subscribe();
        let response = router(state, 1024 * 1024)
            .oneshot(multipart_request(UPLOAD_FIELD))
            .await?;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await?)?;
        assert!(body["message"].is_string());

        let mut events = Vec::new();
        while let Some(event) =
            tokio::time::timeout(Duration::from_secs(5), subscription.recv()).await?
        {
            events.push(event);
        }
        assert_eq!(events.last(), Some(&IngestionEvent::Done));
        assert!(events.iter().any(|event| matches!(
            event,
            IngestionEvent::Log(line) if line.contains("manual.pdf")
        )));
        Ok(())
    }

    #[tokio::test]
    async fn ingest_status_streams_logs_until_done() -> Result<(), Box<dyn std::error::Error>> {
        let (state, _) = test_state();
        let progress = state.progress.clone();
        let response = router(state, 1024)
            .oneshot(Request::get("/api/ingest-status").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(progress.subscriber_count(), 1);

        progress.log("--- Processing: manual.pdf ---");
        progress.done();

        let body = body_text(response).await?;
        assert!(body.contains("data: \"--- Processing: manual.pdf ---\\n\""));
        assert!(body.contains(&format!("event: done\ndata: {DONE_MESSAGE}")));
        let log_at = body.find("Processing").unwrap_or(usize::MAX);
        let done_at = body.find("event: done").unwrap_or(0);
        assert!(log_at < done_at);
        Ok(())
    }

    #[tokio::test]
    async fn app_errors_render_status_and_message() -> Result<(), Box<dyn std::error::Error>> {
        let cases = [
            (
                bad_request("The query field is required."),
                StatusCode::BAD_REQUEST,
                "The query field is required.",
            ),
            (
                AppError::Upload {
                    status: StatusCode::PAYLOAD_TOO_LARGE,
                    message: "upload too large".to_string(),
                },
                StatusCode::PAYLOAD_TOO_LARGE,
                "upload too large",
            ),
            (
                AppError::Internal,
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal server error occurred.",
            ),
        ];

        for (error, status, message) in cases {
            let response = error.into_response();
            assert_eq!(response.status(), status);
            let body: serde_json::Value = serde_json::from_str(&body_text(response).await?)?;
            assert_eq!(body, json!({ "error": message }));
        }
        Ok(())
    }
}
