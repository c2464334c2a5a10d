mod config;
mod server;

use chrono::Utc;
use clap::Parser;
use config::{AppConfig, Cli, Command, EmbeddingBackend};
use futures::StreamExt;
use pdf_chat_core::{
    load_folder_documents, CharacterNgramEmbedder, CompletionProvider, EmbeddingProvider,
    GeminiClient, InMemoryStore, IngestionEvent, QdrantStore, VectorStore,
};
use server::AppState;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_cli(&cli)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-chat boot"
    );

    let gemini = Arc::new(GeminiClient::new(config.gemini.clone())?);
    let completion: Arc<dyn CompletionProvider> = gemini.clone();
    let embedder: Arc<dyn EmbeddingProvider> = match config.embedding_backend {
        EmbeddingBackend::Gemini => gemini,
        EmbeddingBackend::Local => {
            Arc::new(CharacterNgramEmbedder::new(config.gemini.dimensions))
        }
    };
    let store = connect_store(&config).await?;

    let state = AppState::new(
        embedder,
        completion,
        Arc::clone(&store),
        &config.ingestion,
        config.retrieval,
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            spawn_heartbeat(Arc::clone(&store), config.heartbeat_interval);
            server::run_server(state, config.listen, config.max_upload_bytes).await?;
        }
        Command::Ingest { folder } => ingest_folder(&state, &folder).await?,
        Command::Ask { query } => ask(&state, &query).await?,
    }

    Ok(())
}

/// The store must answer a heartbeat before anything else starts.
async fn connect_store(config: &AppConfig) -> anyhow::Result<Arc<dyn VectorStore>> {
    if config.memory_store {
        info!("using in-memory vector store");
        return Ok(Arc::new(InMemoryStore::new()));
    }

    let qdrant = QdrantStore::new(
        &config.qdrant_url,
        &config.qdrant_collection,
        config.gemini.dimensions,
    )?
    .with_api_key(config.qdrant_api_key.clone());

    qdrant.heartbeat().await?;
    qdrant.ensure_collection().await?;
    info!(
        url = %config.qdrant_url,
        collection = %config.qdrant_collection,
        "vector store ready"
    );
    Ok(Arc::new(qdrant))
}

fn spawn_heartbeat(store: Arc<dyn VectorStore>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.heartbeat().await {
                Ok(()) => debug!("vector store heartbeat ok"),
                Err(error) => warn!(%error, "vector store heartbeat failed"),
            }
        }
    });
}

async fn ingest_folder(state: &AppState, folder: &Path) -> anyhow::Result<()> {
    let documents = load_folder_documents(folder).await?;
    info!(folder = %folder.display(), files = documents.len(), "ingesting folder");

    let mut subscription = state.progress.subscribe();
    let pipeline = Arc::clone(&state.pipeline);
    let progress = state.progress.clone();
    let run = tokio::spawn(async move { pipeline.run(documents, &progress).await });

    let mut stdout = tokio::io::stdout();
    while let Some(event) = subscription.recv().await {
        if let IngestionEvent::Log(line) = event {
            stdout.write_all(line.as_bytes()).await?;
        }
    }
    stdout.flush().await?;

    let report = run.await?;
    if let Some(fatal) = report.fatal {
        anyhow::bail!("ingestion aborted: {fatal}");
    }
    println!(
        "{} processed, {} skipped, {} failed at {}",
        report.processed.len(),
        report.skipped.len(),
        report.failed.len(),
        Utc::now().to_rfc3339()
    );
    Ok(())
}

async fn ask(state: &AppState, query: &str) -> anyhow::Result<()> {
    let result = state.chat.process_query(query, &[]).await?;
    let mut body = result.into_body()?;

    let mut stdout = tokio::io::stdout();
    while let Some(bytes) = body.next().await {
        stdout.write_all(&bytes?).await?;
        stdout.flush().await?;
    }
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
