use clap::{Parser, Subcommand, ValueEnum};
use pdf_chat_core::providers::gemini::{
    DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL,
};
use pdf_chat_core::{ConfigError, GeminiConfig, IngestionOptions, RetrievalOptions};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Parser, Debug, Clone)]
#[command(name = "pdf-chat", version, about = "Chat with your PDF documents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Generative Language API base URL
    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub gemini_base_url: String,

    /// Model used for answers and query rewriting
    #[arg(long, env = "CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    pub chat_model: String,

    /// Model used for document and query embeddings
    #[arg(long, env = "EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    /// Embedding vector size, must match the collection
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value_t = 768)]
    pub embedding_dimensions: usize,

    /// Where embeddings come from
    #[arg(long, env = "EMBEDDING_PROVIDER", value_enum, default_value_t = EmbeddingBackend::Gemini)]
    pub embedding_provider: EmbeddingBackend,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    pub qdrant_url: String,

    /// Qdrant collection
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "chatbot-docs")]
    pub qdrant_collection: String,

    /// Qdrant API key
    #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true)]
    pub qdrant_api_key: Option<String>,

    /// Keep vectors in process memory instead of Qdrant
    #[arg(long, default_value_t = false)]
    pub memory_store: bool,

    #[arg(long, env = "BIND", default_value = "0.0.0.0")]
    pub bind: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Upload size limit in megabytes
    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = 200)]
    pub max_upload_mb: usize,

    /// Number of chunks retrieved per question
    #[arg(long, env = "TOP_K", default_value_t = 5)]
    pub top_k: usize,

    /// Seconds between vector store heartbeats
    #[arg(long, env = "HEARTBEAT_SECS", default_value_t = 300)]
    pub heartbeat_secs: u64,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Ingest every PDF under a folder and print progress.
    Ingest {
        /// Folder that contains PDFs recursively.
        #[arg(long)]
        folder: PathBuf,
    },
    /// Ask one question and print the response body.
    Ask {
        #[arg(long)]
        query: String,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    Gemini,
    Local,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini: GeminiConfig,
    pub embedding_backend: EmbeddingBackend,
    pub qdrant_url: String,
    pub qdrant_collection: String,
    pub qdrant_api_key: Option<String>,
    pub memory_store: bool,
    pub listen: SocketAddr,
    pub max_upload_bytes: usize,
    pub retrieval: RetrievalOptions,
    pub ingestion: IngestionOptions,
    pub heartbeat_interval: Duration,
}

impl AppConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let api_key = cli
            .gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::Missing("GEMINI_API_KEY"))?;

        Url::parse(&cli.gemini_base_url).map_err(|source| ConfigError::Url {
            name: "GEMINI_BASE_URL",
            source,
        })?;
        if !cli.memory_store {
            Url::parse(&cli.qdrant_url).map_err(|source| ConfigError::Url {
                name: "QDRANT_URL",
                source,
            })?;
        }

        if cli.embedding_dimensions == 0 {
            return Err(invalid("EMBEDDING_DIMENSIONS", "must be greater than zero"));
        }
        if cli.top_k == 0 {
            return Err(invalid("TOP_K", "must be greater than zero"));
        }
        if cli.heartbeat_secs == 0 {
            return Err(invalid("HEARTBEAT_SECS", "must be greater than zero"));
        }
        if cli.qdrant_collection.trim().is_empty() {
            return Err(invalid("QDRANT_COLLECTION", "must not be empty"));
        }

        let ip: IpAddr = cli
            .bind
            .parse()
            .map_err(|error: std::net::AddrParseError| invalid("BIND", error.to_string()))?;

        Ok(Self {
            gemini: GeminiConfig {
                api_key: api_key.to_string(),
                base_url: cli.gemini_base_url.clone(),
                chat_model: cli.chat_model.clone(),
                embedding_model: cli.embedding_model.clone(),
                dimensions: cli.embedding_dimensions,
            },
            embedding_backend: cli.embedding_provider,
            qdrant_url: cli.qdrant_url.clone(),
            qdrant_collection: cli.qdrant_collection.clone(),
            qdrant_api_key: cli.qdrant_api_key.clone(),
            memory_store: cli.memory_store,
            listen: SocketAddr::new(ip, cli.port),
            max_upload_bytes: cli.max_upload_mb.saturating_mul(1024 * 1024),
            retrieval: RetrievalOptions { top_k: cli.top_k },
            ingestion: IngestionOptions::default(),
            heartbeat_interval: Duration::from_secs(cli.heartbeat_secs),
        })
    }
}

fn invalid(name: &'static str, details: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        details: details.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["pdf-chat"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn defaults_produce_a_valid_config() -> Result<(), ConfigError> {
        let config = AppConfig::from_cli(&parse(&["--gemini-api-key", "secret"]))?;

        assert_eq!(config.gemini.chat_model, "gemini-2.5-flash");
        assert_eq!(config.gemini.embedding_model, "text-embedding-004");
        assert_eq!(config.gemini.dimensions, 768);
        assert_eq!(config.qdrant_collection, "chatbot-docs");
        assert_eq!(config.listen.port(), 8080);
        assert_eq!(config.max_upload_bytes, 200 * 1024 * 1024);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(300));
        assert_eq!(config.embedding_backend, EmbeddingBackend::Gemini);
        Ok(())
    }

    #[test]
    fn blank_api_key_is_a_configuration_failure() {
        let result = AppConfig::from_cli(&parse(&["--gemini-api-key", "  "]));
        assert!(matches!(result, Err(ConfigError::Missing("GEMINI_API_KEY"))));
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let result = AppConfig::from_cli(&parse(&["--gemini-api-key", "k", "--top-k", "0"]));
        assert!(matches!(result, Err(ConfigError::Invalid { name: "TOP_K", .. })));
    }

    #[test]
    fn unparsable_qdrant_url_is_rejected_unless_memory_store() {
        let result = AppConfig::from_cli(&parse(&[
            "--gemini-api-key",
            "k",
            "--qdrant-url",
            "not a url",
        ]));
        assert!(matches!(result, Err(ConfigError::Url { name: "QDRANT_URL", .. })));

        let result = AppConfig::from_cli(&parse(&[
            "--gemini-api-key",
            "k",
            "--qdrant-url",
            "not a url",
            "--memory-store",
        ]));
        assert!(result.is_ok());
    }

    #[test]
    fn subcommands_parse() {
        let cli = parse(&["--gemini-api-key", "k", "ingest", "--folder", "/tmp/docs"]);
        assert!(matches!(
            cli.command,
            Some(Command::Ingest { ref folder }) if folder == &PathBuf::from("/tmp/docs")
        ));

        let cli = parse(&["--embedding-provider", "local", "ask", "--query", "pressure?"]);
        assert_eq!(cli.embedding_provider, EmbeddingBackend::Local);
        assert!(matches!(cli.command, Some(Command::Ask { ref query }) if query == "pressure?"));
    }
}
