use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::response::sse::Event;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use crate::config::Config;
use crate::llm::{HttpChatModel, HttpEmbedder, PromptSource};
use crate::responder::Responder;
use crate::search::open_index;
use crate::store::SessionStore;
use crate::surface::{ChatSurface, Command, Phase};

/// Concurrent answer generations across all surfaces.
const MAX_CONCURRENT_CHATS: usize = 3;

/// A surface plus the event feed of its running turn.
pub struct SurfaceEntry {
    pub surface: ChatSurface,
    /// Events of the latest turn, held until a client subscribes.
    pub events: Option<UnboundedReceiver<Event>>,
    pub last_seen: Instant,
}

impl SurfaceEntry {
    pub fn new(surface: ChatSurface) -> Self {
        Self {
            surface,
            events: None,
            last_seen: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }
}

pub type SurfaceRegistry = Arc<Mutex<HashMap<Uuid, SurfaceEntry>>>;

/// Drop Idle surfaces untouched for at least `max_idle` and return the
/// commands that flush their sessions. Surfaces awaiting a response stay.
pub fn evict_idle(surfaces: &SurfaceRegistry, max_idle: Duration) -> Vec<Command> {
    let mut flushed = Vec::new();
    surfaces.lock().retain(|id, entry| {
        let idle = entry.surface.phase() == Phase::Idle && entry.last_seen.elapsed() >= max_idle;
        if idle {
            tracing::debug!("Evicting idle surface {id}");
            flushed.extend(entry.surface.flush());
        }
        !idle
    });
    flushed
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: SessionStore,
    pub responder: Arc<Responder>,
    pub surfaces: SurfaceRegistry,
    pub chat_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let store = SessionStore::open(&config.db_path()).await?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        let index = open_index(&config, http_client.clone())?;
        let responder = Responder::new(
            store.clone(),
            Arc::new(HttpEmbedder::new(http_client.clone(), config.llm.clone())),
            index,
            Arc::new(HttpChatModel::new(http_client, config.llm.clone())),
            PromptSource::File(config.prompt_path.clone()),
        )
        .with_top_k(config.top_k);

        Ok(Self::from_parts(config, store, responder))
    }

    /// Assemble state from already-built collaborators.
    pub fn from_parts(config: Config, store: SessionStore, responder: Responder) -> Self {
        Self {
            config,
            store,
            responder: Arc::new(responder),
            surfaces: Arc::new(Mutex::new(HashMap::new())),
            chat_semaphore: Arc::new(tokio::sync::Semaphore::new(MAX_CONCURRENT_CHATS)),
        }
    }
}
