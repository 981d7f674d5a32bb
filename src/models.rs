use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata attached to a document or chunk.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

const PREVIEW_CHARS: usize = 24;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Bot => "bot",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn bot(content: impl Into<String>) -> Self {
        Self {
            role: Role::Bot,
            content: content.into(),
        }
    }
}

/// A persisted session as returned by a per-user listing.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Short label for the session: its first user message.
    pub fn preview(&self) -> String {
        let first = self
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        if first.is_empty() {
            return "Empty session".to_string();
        }
        if first.chars().count() > PREVIEW_CHARS {
            let head: String = first.chars().take(PREVIEW_CHARS).collect();
            format!("{head}..")
        } else {
            first.to_string()
        }
    }
}

/// A loaded source document (a PDF page or a whole text file).
#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    pub metadata: Metadata,
}

/// A bounded span of document text ready for embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub metadata: Metadata,
}

/// A chunk returned from a similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub text: String,
    pub metadata: Metadata,
    /// Higher is more similar.
    pub score: f32,
}

// ─── API types ───────────────────────────────────────────

/// Create-surface request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenSurfaceRequest {
    /// Identity supplied by the upstream identity provider, if logged in.
    pub user_id: Option<String>,
}

/// Submit-message request
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub message: String,
}

/// Single session response
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub messages: Vec<Message>,
}

/// Entry in a user's session list
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub preview: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl From<SessionRecord> for SessionSummary {
    fn from(record: SessionRecord) -> Self {
        Self {
            preview: record.preview(),
            session_id: record.session_id,
            created_at: record.created_at,
            messages: record.messages,
        }
    }
}
