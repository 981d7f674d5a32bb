//! Retrieval-augmented answering for one chat turn.
//!
//! ```text
//! question ─┬─> SessionStore::get ──> "role: content" history ─┐
//!           └─> Embedder::embed_query ─> VectorIndex top-k ────┼─> prompt ─> ChatModel::stream
//!                                                              │
//!                                       PromptSource::load ────┘
//! ```

use std::sync::Arc;

use futures_util::stream::{self, Stream, StreamExt};

use crate::error::Result;
use crate::llm::prompt::render_chat_history;
use crate::llm::{ChatModel, Embedder, FragmentStream, PromptSource};
use crate::search::VectorIndex;
use crate::store::SessionStore;

pub const DEFAULT_TOP_K: usize = 5;

#[derive(Clone)]
pub struct Responder {
    store: SessionStore,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    model: Arc<dyn ChatModel>,
    prompt: PromptSource,
    top_k: usize,
}

impl Responder {
    pub fn new(
        store: SessionStore,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        model: Arc<dyn ChatModel>,
        prompt: PromptSource,
    ) -> Self {
        Self {
            store,
            embedder,
            index,
            model,
            prompt,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Answer `question` in the context of the turns already stored for
    /// `session_id`. Fragments are yielded as the model produces them.
    pub async fn respond(&self, question: &str, session_id: &str) -> Result<FragmentStream> {
        let history = match self.store.get(session_id).await {
            Ok(messages) => render_chat_history(&messages),
            Err(e) => {
                tracing::warn!("Failed to load history for session {session_id}: {e}");
                String::new()
            }
        };

        let template = self.prompt.load()?;

        let query_embedding = self.embedder.embed_query(question).await?;
        let hits = self
            .index
            .similarity_search(&query_embedding, self.top_k)
            .await?;
        tracing::debug!("Retrieved {} chunks for session {session_id}", hits.len());

        let context = hits
            .iter()
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = template.render(&history, &context, question)?;
        self.model.stream(&prompt).await
    }
}

/// Plain-text view of a turn: fragments pass through until the first failure,
/// which becomes a single error fragment that ends the stream.
pub fn display_fragments(turn: Result<FragmentStream>) -> impl Stream<Item = String> + Send {
    let fragments = match turn {
        Ok(fragments) => fragments,
        Err(e) => stream::once(async move { Err::<String, _>(e) }).boxed(),
    };

    stream::unfold(Some(fragments), |state| async move {
        let mut fragments = state?;
        match fragments.next().await {
            Some(Ok(text)) => Some((text, Some(fragments))),
            Some(Err(e)) => Some((error_fragment(&e), None)),
            None => None,
        }
    })
}

fn error_fragment(e: &crate::error::Error) -> String {
    format!("Error generating response: {e}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn scripted(items: Vec<Result<String>>) -> FragmentStream {
        stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn test_display_passes_fragments_through() {
        let out: Vec<String> =
            display_fragments(Ok(scripted(vec![Ok("a".into()), Ok("b".into())])))
                .collect()
                .await;
        assert_eq!(out, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_display_stops_after_first_error() {
        let out: Vec<String> = display_fragments(Ok(scripted(vec![
            Ok("partial".into()),
            Err(Error::Generation("quota".into())),
            Ok("never".into()),
        ])))
        .collect()
        .await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], "partial");
        assert!(out[1].contains("quota"));
    }

    #[tokio::test]
    async fn test_display_failed_turn_is_one_fragment() {
        let out: Vec<String> = display_fragments(Err(Error::Embedding("unreachable".into())))
            .collect()
            .await;
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("Error generating response"));
        assert!(out[0].contains("unreachable"));
    }
}
