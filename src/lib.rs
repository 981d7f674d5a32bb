//! # rag-chat
//!
//! A retrieval-augmented chat server. Documents are split, embedded and
//! stored in a vector index ahead of time; each question is answered from the
//! most similar chunks plus the prior turns of its session, streamed back to
//! the browser and saved to a local SQLite session store.
//!
//! ## Architecture
//!
//! ```text
//!   rag-chat ingest <GLOB>                       rag-chat serve
//!          │                                            │
//!          ▼                                            ▼
//!   ┌──────────────┐                         ┌────────────────────┐
//!   │ glob + load  │  PDF pages / text       │   Chat Surface     │  state machine,
//!   └──────┬───────┘                         │ Idle ⇄ Awaiting    │  emits commands
//!          ▼                                 └─────────┬──────────┘
//!   ┌──────────────┐                                   │ Respond
//!   │  recursive   │  1000 chars / 200 overlap         ▼
//!   │  splitter    │                         ┌────────────────────┐
//!   └──────┬───────┘                         │     Responder      │
//!          ▼                                 │ history + top-k +  │
//!   ┌──────────────┐                         │ prompt template    │
//!   │  Embedder    │◄────────────────────────┤                    │
//!   └──────┬───────┘      embed_query        └─────────┬──────────┘
//!          ▼                                           │ fragments (SSE)
//!   ┌──────────────┐      similarity_search            ▼
//!   │ VectorIndex  │◄──────────────────────── ChatModel::stream
//!   │ (Documents)  │                                   │
//!   └──────────────┘                                   ▼ Persist
//!                                            ┌────────────────────┐
//!                                            │   SessionStore     │
//!                                            │    (SQLite)        │
//!                                            └────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, storage, models and vector DB
//! - [`error`] - Crate-wide error taxonomy
//! - [`models`] - Shared data types: `Message`, `SessionRecord`, `Chunk`, request/response types
//! - [`store`] - SQLite session store on an `sqlx` pool
//! - [`chunking`] - Recursive character splitter and metadata key sanitizer
//! - [`ingest`] - Glob discovery, PDF/text loading and the ingestion pipeline
//! - [`llm::embeddings`] - Batch embedding via Gemini, Ollama or OpenAI-compatible APIs
//! - [`llm::chat_stream`] - Streaming answer generation for the same providers
//! - [`llm::prompt`] - Jinja prompt template with `chat_history`, `context`, `question`
//! - [`search`] - `VectorIndex` trait with Weaviate and in-memory backends
//! - [`responder`] - Retrieval-augmented answering for one turn
//! - [`surface`] - Per-browser chat state machine and its view
//! - [`api`] - Axum HTTP handlers and SSE response streaming
//! - [`state`] - Shared application state

pub mod api;
pub mod chunking;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod responder;
pub mod search;
pub mod state;
pub mod store;
pub mod surface;
