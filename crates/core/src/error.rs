use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] ProviderError),

    #[error("vector store write failed: {0}")]
    Store(#[from] StoreError),

    #[error("extraction task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid response from {provider}: {details}")]
    BackendResponse { provider: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("provider returned {returned} embeddings for a batch of {requested}")]
    BatchSizeMismatch { requested: usize, returned: usize },

    #[error("provider returned an empty response")]
    EmptyResponse,

    #[error("completion stream failed: {0}")]
    Stream(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store request failed: {0}")]
    Request(String),

    #[error("store not available yet: {0}")]
    NotReady(String),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),

    #[error("query embedding failed: {0}")]
    Embedding(ProviderError),

    #[error("completion failed: {0}")]
    Completion(ProviderError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {details}")]
    Invalid { name: &'static str, details: String },

    #[error("url parse error for {name}: {source}")]
    Url {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
