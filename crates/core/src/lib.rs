pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod prompt;
pub mod providers;
pub mod query;
pub mod retriever;
pub mod store;
pub mod stores;
pub mod traits;

pub use chunking::{chunk_text, ChunkingConfig};
pub use embeddings::{
    CharacterNgramEmbedder, EmbeddingBatcher, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_EMBED_BATCH_SIZE,
};
pub use error::{ChatError, ConfigError, IngestError, ProviderError, StoreError};
pub use extractor::{extract_text, extract_text_from_path, LopdfExtractor, TextExtractor};
pub use ingest::{
    discover_pdf_files, load_folder_documents, FailedDocument, IngestionPipeline,
    IngestionReport, ProcessedDocument, PIPELINE_ERROR_PREFIX,
};
pub use models::{
    ConversationTurn, Document, Embedding, IngestionEvent, IngestionOptions, RecordMetadata,
    RetrievalOptions, Role, TaskType, TextChunk, VectorMatch, VectorRecord,
};
pub use orchestrator::{ChatService, ChatStage, QueryResult, STREAM_SEPARATOR};
pub use progress::{DoneGuard, ProgressChannel, Subscription};
pub use prompt::{build_augmented_prompt, build_rewrite_prompt, REFUSAL_SENTENCE};
pub use providers::{GeminiClient, GeminiConfig};
pub use query::QueryTransformer;
pub use retriever::Retriever;
pub use store::{build_records, RecordIdGenerator, VectorStoreWriter, DEFAULT_UPSERT_BATCH_SIZE};
pub use stores::{InMemoryStore, QdrantStore};
pub use traits::{CompletionProvider, EmbeddingProvider, TextStream, VectorStore};
