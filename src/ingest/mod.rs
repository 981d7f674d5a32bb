//! One-shot document ingestion: discover, load, split, embed, upsert.

pub mod loader;

use std::sync::Arc;

use crate::chunking::{chunk_documents, RecursiveSplitter};
use crate::error::{Error, Result};
use crate::llm::{EmbedTask, Embedder};
use crate::models::Document;
use crate::search::VectorIndex;

/// Chunk texts sent per embedding call.
const EMBED_BATCH_SIZE: usize = 100;

/// Counts from a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestReport {
    pub files: usize,
    pub documents: usize,
    pub chunks: usize,
}

pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    splitter: RecursiveSplitter,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        splitter: RecursiveSplitter,
    ) -> Self {
        Self {
            embedder,
            index,
            splitter,
        }
    }

    /// Ingest every file matching `pattern`. The first failing stage aborts
    /// the run; nothing is upserted unless every chunk was embedded.
    pub async fn ingest(&self, pattern: &str) -> Result<IngestReport> {
        let files = loader::discover(pattern)?;
        tracing::info!("Found {} files matching {pattern}", files.len());

        let paths = files.clone();
        let documents: Vec<Document> = tokio::task::spawn_blocking(move || {
            let mut documents = Vec::new();
            for path in &paths {
                documents.extend(loader::load_file(path)?);
            }
            Ok::<_, Error>(documents)
        })
        .await
        .map_err(|e| Error::Load(format!("loader task failed: {e}")))??;
        tracing::info!("Loaded {} documents", documents.len());

        let chunks = chunk_documents(&self.splitter, &documents);
        tracing::info!(
            "Split into {} chunks (size {}, overlap {})",
            chunks.len(),
            self.splitter.chunk_size(),
            self.splitter.chunk_overlap()
        );

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            embeddings.extend(self.embedder.embed(&texts, EmbedTask::Document).await?);
        }

        self.index.ensure_index().await?;
        let stored = self.index.upsert(&chunks, embeddings).await?;
        tracing::info!("Stored {stored} chunks in the vector index");

        Ok(IngestReport {
            files: files.len(),
            documents: documents.len(),
            chunks: stored,
        })
    }
}
