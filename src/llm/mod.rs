//! Remote model access: embeddings, streaming generation and the prompt template.

pub mod chat_stream;
pub mod embeddings;
pub mod prompt;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::stream::Stream;

use crate::error::Result;

pub use chat_stream::HttpChatModel;
pub use embeddings::{EmbedTask, HttpEmbedder};
pub use prompt::{PromptSource, PromptTemplate};

/// Answer fragments in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Turns text into vectors for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String], task: EmbedTask) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()], EmbedTask::Query).await?;
        vectors
            .pop()
            .ok_or_else(|| crate::error::Error::Embedding("no embedding returned".to_string()))
    }
}

/// Generates an answer for a filled prompt, one fragment at a time.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream(&self, prompt: &str) -> Result<FragmentStream>;
}
