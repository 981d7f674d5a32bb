//! Vector index backends.
//!
//! - [`weaviate`] - remote Weaviate collection over its REST/GraphQL API
//! - [`vector`] - in-memory cosine-similarity index persisted to JSON

pub mod vector;
pub mod weaviate;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Chunk, ScoredChunk};

pub use vector::MemoryIndex;
pub use weaviate::WeaviateIndex;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if it does not exist yet.
    async fn ensure_index(&self) -> Result<()>;

    /// Store chunks with their embeddings. `embeddings` is parallel to `chunks`.
    async fn upsert(&self, chunks: &[Chunk], embeddings: Vec<Vec<f32>>) -> Result<usize>;

    /// The `k` chunks nearest to `query_embedding`, most similar first.
    async fn similarity_search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;
}

/// Build the backend selected by `VECTOR_STORE_BACKEND`.
pub fn open_index(config: &Config, client: reqwest::Client) -> Result<Arc<dyn VectorIndex>> {
    match config.vector_store.backend.as_str() {
        "weaviate" => Ok(Arc::new(WeaviateIndex::new(
            client,
            config.vector_store.clone(),
        )?)),
        "memory" => Ok(Arc::new(MemoryIndex::open_or_create(&config.vector_path())?)),
        other => Err(Error::Index(format!("unknown vector store backend: {other}"))),
    }
}

fn check_parallel(chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != embeddings.len() {
        return Err(Error::Index(format!(
            "{} chunks but {} embeddings",
            chunks.len(),
            embeddings.len()
        )));
    }
    Ok(())
}
