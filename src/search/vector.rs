use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::{Chunk, Metadata, ScoredChunk};
use crate::search::{check_parallel, VectorIndex};

/// A stored vector entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    text: String,
    #[serde(default)]
    metadata: Metadata,
    embedding: Vec<f32>,
}

/// In-memory vector index with optional disk persistence and cosine similarity search.
pub struct MemoryIndex {
    entries: RwLock<Vec<VectorEntry>>,
    persist_path: Option<PathBuf>,
}

impl MemoryIndex {
    /// An index that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            persist_path: None,
        }
    }

    pub fn open_or_create(persist_path: &Path) -> Result<Self> {
        let entries = if persist_path.exists() {
            let data = std::fs::read_to_string(persist_path)
                .with_context(|| format!("Failed to read vector file {}", persist_path.display()))
                .map_err(Error::index)?;
            serde_json::from_str(&data)
                .with_context(|| format!("Corrupt vector file {}", persist_path.display()))
                .map_err(Error::index)?
        } else {
            Vec::new()
        };

        Ok(Self {
            entries: RwLock::new(entries),
            persist_path: Some(persist_path.to_path_buf()),
        })
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Persist entries to disk (atomic write via temp file + rename).
    fn persist(&self, entries: &[VectorEntry]) -> anyhow::Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string(entries)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    fn search(&self, query_embedding: &[f32], limit: usize) -> Vec<ScoredChunk> {
        let entries = self.entries.read();

        let mut scored: Vec<(f32, &VectorEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
            .collect();

        // Sort descending by score
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(score, e)| ScoredChunk {
                text: e.text.clone(),
                metadata: e.metadata.clone(),
                score,
            })
            .collect()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_index(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, chunks: &[Chunk], embeddings: Vec<Vec<f32>>) -> Result<usize> {
        check_parallel(chunks, &embeddings)?;

        let mut entries = self.entries.write();
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            entries.push(VectorEntry {
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
                embedding,
            });
        }

        self.persist(&entries).map_err(Error::index)?;
        Ok(chunks.len())
    }

    async fn similarity_search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        Ok(self.search(query_embedding, k))
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let index = MemoryIndex::in_memory();
        index
            .upsert(
                &[chunk("server"), chunk("database"), chunk("http")],
                vec![vec![0.1, 0.2, 0.9], vec![0.9, 0.1, 0.1], vec![0.2, 0.8, 0.3]],
            )
            .await
            .unwrap();

        let hits = index.similarity_search(&[0.95, 0.05, 0.05], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "database");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_upsert_rejects_mismatched_embeddings() {
        let index = MemoryIndex::in_memory();
        let err = index.upsert(&[chunk("a")], vec![]).await.unwrap_err();
        assert!(matches!(err, Error::Index(_)));
        assert_eq!(index.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.json");

        let index = MemoryIndex::open_or_create(&path).unwrap();
        index.upsert(&[chunk("kept")], vec![vec![1.0, 0.0]]).await.unwrap();
        drop(index);

        let reopened = MemoryIndex::open_or_create(&path).unwrap();
        assert_eq!(reopened.entry_count(), 1);
        let hits = reopened.similarity_search(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits[0].text, "kept");
    }

    #[test]
    fn test_corrupt_file_is_index_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(MemoryIndex::open_or_create(&path), Err(Error::Index(_))));
    }
}
