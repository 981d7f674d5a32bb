//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;

use rag_chat::error::{Error, Result};
use rag_chat::llm::{ChatModel, EmbedTask, Embedder, FragmentStream, PromptSource};
use rag_chat::responder::Responder;
use rag_chat::search::{MemoryIndex, VectorIndex};
use rag_chat::store::SessionStore;

pub const TEMPLATE: &str = "History:\n{{ chat_history }}\nContext:\n{{ context }}\nQuestion: {{ question }}";

const VOCABULARY: [&str; 4] = ["rust", "python", "weaviate", "sqlite"];

/// Embeds text as keyword counts over a fixed vocabulary.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: Mutex<Vec<(usize, EmbedTask)>>,
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String], task: EmbedTask) -> Result<Vec<Vec<f32>>> {
        self.calls.lock().push((texts.len(), task));
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut vector: Vec<f32> = VOCABULARY
        .iter()
        .map(|word| lower.matches(word).count() as f32)
        .collect();
    // Keeps unrelated text from being a zero vector.
    vector.push(0.1);
    vector
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: &[String], _task: EmbedTask) -> Result<Vec<Vec<f32>>> {
        Err(Error::Embedding("embedding service unavailable".to_string()))
    }
}

/// How a [`ScriptedModel`] behaves once prompted.
#[derive(Clone)]
pub enum Script {
    Answer(Vec<&'static str>),
    FailBeforeStream(&'static str),
    FailMidStream(Vec<&'static str>, &'static str),
    /// Accepts the prompt and never produces a fragment.
    Stall,
}

/// Chat model that replays a script and records every prompt.
pub struct ScriptedModel {
    script: Script,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn stream(&self, prompt: &str) -> Result<FragmentStream> {
        self.prompts.lock().push(prompt.to_string());

        let items: Vec<Result<String>> = match &self.script {
            Script::Answer(fragments) => fragments.iter().map(|f| Ok(f.to_string())).collect(),
            Script::FailBeforeStream(message) => {
                return Err(Error::Generation(message.to_string()));
            }
            Script::FailMidStream(fragments, message) => fragments
                .iter()
                .map(|f| Ok(f.to_string()))
                .chain(std::iter::once(Err(Error::Generation(message.to_string()))))
                .collect(),
            Script::Stall => return Ok(stream::pending::<Result<String>>().boxed()),
        };
        Ok(stream::iter(items).boxed())
    }
}

pub async fn temp_store(dir: &tempfile::TempDir) -> SessionStore {
    SessionStore::open(&dir.path().join("chat_history.db"))
        .await
        .unwrap()
}

/// A responder over a memory index seeded with `documents`.
pub async fn responder_with(
    store: SessionStore,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn ChatModel>,
    documents: &[&str],
) -> Responder {
    let index = Arc::new(MemoryIndex::in_memory());
    if !documents.is_empty() {
        let chunks: Vec<rag_chat::models::Chunk> = documents
            .iter()
            .map(|text| rag_chat::models::Chunk {
                text: text.to_string(),
                metadata: Default::default(),
            })
            .collect();
        let embeddings = documents.iter().map(|t| keyword_vector(t)).collect();
        index.upsert(&chunks, embeddings).await.unwrap();
    }

    Responder::new(
        store,
        embedder,
        index,
        model,
        PromptSource::Inline(TEMPLATE.to_string()),
    )
}
