//! The RAG prompt template.
//!
//! Templates are Jinja (minijinja) with three slots: `chat_history`,
//! `context` and `question`. Undefined variables are an error so a typo in a
//! slot name fails the turn instead of sending a half-empty prompt.

use std::path::PathBuf;

use minijinja::{context, Environment, UndefinedBehavior};

use crate::error::{Error, Result};

/// Where the template text comes from.
#[derive(Debug, Clone)]
pub enum PromptSource {
    /// Re-read on every turn so edits apply without a restart.
    File(PathBuf),
    Inline(String),
}

impl PromptSource {
    pub fn load(&self) -> Result<PromptTemplate> {
        let source = match self {
            PromptSource::File(path) => std::fs::read_to_string(path).map_err(|e| {
                Error::Template(format!("failed to read {}: {e}", path.display()))
            })?,
            PromptSource::Inline(source) => source.clone(),
        };
        PromptTemplate::new(source)
    }
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    source: String,
}

impl PromptTemplate {
    /// Parse `source`, rejecting templates with syntax errors.
    pub fn new(source: String) -> Result<Self> {
        environment()
            .template_from_str(&source)
            .map_err(|e| Error::Template(e.to_string()))?;
        Ok(Self { source })
    }

    pub fn render(&self, chat_history: &str, context: &str, question: &str) -> Result<String> {
        let env = environment();
        let template = env
            .template_from_str(&self.source)
            .map_err(|e| Error::Template(e.to_string()))?;
        template
            .render(context! { chat_history, context, question })
            .map_err(|e| Error::Template(e.to_string()))
    }
}

fn environment<'source>() -> Environment<'source> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env
}

/// Flatten prior turns into `role: content` lines.
pub fn render_chat_history(messages: &[crate::models::Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
