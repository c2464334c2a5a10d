use crate::chunking::{chunk_text, ChunkingConfig};
use crate::embeddings::EmbeddingBatcher;
use crate::extractor::{extract_text, LopdfExtractor, TextExtractor};
use crate::progress::{DoneGuard, ProgressChannel};
use crate::store::VectorStoreWriter;
use crate::traits::{EmbeddingProvider, VectorStore};
use crate::{Document, IngestError, IngestionOptions, TaskType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use walkdir::WalkDir;

pub const PIPELINE_ERROR_PREFIX: &str = "ERRO NO PIPELINE";

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Loads every pdf under `folder`. Unreadable files are logged and left out.
pub async fn load_folder_documents(folder: &Path) -> Result<Vec<Document>, IngestError> {
    if !folder.is_dir() {
        return Err(IngestError::InvalidArgument(format!(
            "not a directory: {}",
            folder.display()
        )));
    }

    let mut documents = Vec::new();
    for path in discover_pdf_files(folder) {
        match Document::from_path(&path).await {
            Ok(document) => documents.push(document),
            Err(error) => warn!(path = %path.display(), %error, "skipping unreadable pdf"),
        }
    }
    Ok(documents)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedDocument {
    pub name: String,
    /// Hex sha256 of the uploaded bytes.
    pub checksum: String,
    pub vector_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDocument {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub processed: Vec<ProcessedDocument>,
    /// Documents without extractable text.
    pub skipped: Vec<String>,
    pub failed: Vec<FailedDocument>,
    pub fatal: Option<String>,
}

pub struct IngestionPipeline<E: ?Sized, S: ?Sized> {
    extractor: Arc<dyn TextExtractor>,
    chunking: ChunkingConfig,
    batcher: EmbeddingBatcher<E>,
    writer: VectorStoreWriter<S>,
}

impl<E, S> IngestionPipeline<E, S>
where
    E: EmbeddingProvider + ?Sized,
    S: VectorStore + ?Sized,
{
    pub fn new(embedder: Arc<E>, store: Arc<S>) -> Self {
        Self {
            extractor: Arc::new(LopdfExtractor),
            chunking: ChunkingConfig::default(),
            batcher: EmbeddingBatcher::new(embedder),
            writer: VectorStoreWriter::new(store),
        }
    }

    pub fn with_options(mut self, options: &IngestionOptions) -> Self {
        self.chunking = ChunkingConfig::from(options);
        self.batcher = self.batcher.with_batch_size(options.embed_batch_size);
        self.writer = self.writer.with_batch_size(options.upsert_batch_size);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Processes `documents` one after another. A failing document is
    /// reported and skipped; `Done` is published exactly once however the run ends.
    pub async fn run(
        &self,
        documents: Vec<Document>,
        progress: &ProgressChannel,
    ) -> IngestionReport {
        let _done = DoneGuard::new(progress.clone());
        progress.log("--- STARTING INGESTION PIPELINE (IN MEMORY) ---");

        let mut report = IngestionReport::default();
        if let Err(error) = self.process_all(documents, progress, &mut report).await {
            progress.log(format!("{PIPELINE_ERROR_PREFIX}: {error}"));
            report.fatal = Some(error.to_string());
        }

        progress.log("--- INGESTION PIPELINE FINISHED ---");
        report
    }

    async fn process_all(
        &self,
        documents: Vec<Document>,
        progress: &ProgressChannel,
        report: &mut IngestionReport,
    ) -> Result<(), IngestError> {
        if documents.is_empty() {
            progress.log("No files received for processing.");
            return Ok(());
        }

        self.writer.store().heartbeat().await?;

        for document in documents {
            let name = document.name.clone();
            let checksum = document.checksum();
            progress.log(format!("\n--- Processing: {name} ---"));

            match self.process_document(document, progress).await {
                Ok(Some(vector_count)) => {
                    progress.log(format!(
                        "--- File {name} processed successfully \
                         ({vector_count} vectors, sha256 {checksum})."
                    ));
                    report.processed.push(ProcessedDocument {
                        name,
                        checksum,
                        vector_count,
                    });
                }
                Ok(None) => {
                    progress.log(format!("--- File {name} has no extractable text, skipped."));
                    report.skipped.push(name);
                }
                Err(error) => {
                    progress.log(format!("ERROR processing {name}: {error}"));
                    report.failed.push(FailedDocument {
                        name,
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    async fn process_document(
        &self,
        document: Document,
        progress: &ProgressChannel,
    ) -> Result<Option<usize>, IngestError> {
        let name = document.name.clone();
        let extractor = Arc::clone(&self.extractor);
        let text = tokio::task::spawn_blocking(move || extract_text(extractor.as_ref(), &document))
            .await
            .map_err(|error| IngestError::Task(error.to_string()))?;

        if text.trim().is_empty() {
            return Ok(None);
        }

        let chunks = chunk_text(&name, &text, self.chunking)?;
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.batcher.embed_all(&texts, TaskType::Document).await?;

        progress.log(format!("[vector store] saving {} vectors...", chunks.len()));
        let written = self.writer.write(&chunks, embeddings).await?;
        Ok(Some(written))
    }
}
