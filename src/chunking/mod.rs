//! Document chunking: recursive character splitting plus metadata cleanup.

pub mod metadata;
pub mod recursive;

pub use metadata::{sanitize_key, sanitize_metadata};
pub use recursive::RecursiveSplitter;

use crate::models::{Chunk, Document};

/// Split every document and attach its sanitized metadata to each chunk.
pub fn chunk_documents(splitter: &RecursiveSplitter, documents: &[Document]) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for document in documents {
        let metadata = sanitize_metadata(document.metadata.clone());
        for text in splitter.split(&document.text) {
            chunks.push(Chunk {
                text,
                metadata: metadata.clone(),
            });
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use serde_json::json;

    fn document(text: &str, source: &str) -> Document {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), json!(source));
        metadata.insert("pdf.producer".into(), json!("writer"));
        Document {
            text: text.to_string(),
            metadata,
        }
    }

    #[test]
    fn test_chunk_documents_carries_metadata() {
        let splitter = RecursiveSplitter::new(20, 0).unwrap();
        let docs = vec![
            document("first paragraph\n\nsecond paragraph", "a.pdf"),
            document("third", "b.pdf"),
        ];

        let chunks = chunk_documents(&splitter, &docs);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].metadata.get("source"), Some(&json!("a.pdf")));
        assert_eq!(chunks[2].metadata.get("source"), Some(&json!("b.pdf")));
        assert!(chunks.iter().all(|c| c.metadata.contains_key("pdf_producer")));
    }

    #[test]
    fn test_chunk_documents_skips_blank_pages() {
        let splitter = RecursiveSplitter::new(20, 0).unwrap();
        let docs = vec![document("   ", "blank.pdf")];
        assert!(chunk_documents(&splitter, &docs).is_empty());
    }
}
