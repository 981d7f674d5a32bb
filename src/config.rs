use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the session database and local vector data are stored
    pub data_dir: PathBuf,
    /// Session database file; defaults to `<data_dir>/chat_history.db`
    pub db_path: Option<PathBuf>,
    /// Server bind address
    pub bind_addr: String,
    /// Prompt template with `chat_history`, `context` and `question` slots
    pub prompt_path: PathBuf,
    /// Number of chunks retrieved per question
    pub top_k: usize,
    /// Idle surfaces older than this are dropped from the registry
    pub surface_idle_secs: u64,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Vector database configuration
    pub vector_store: VectorStoreConfig,
    /// Document splitting configuration
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "gemini", "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for answer generation
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// "weaviate" or "memory"
    pub backend: String,
    /// Weaviate base URL
    pub url: String,
    pub api_key: Option<String>,
    /// Collection (class) name holding the chunks
    pub index_name: String,
    /// Property holding the chunk text
    pub text_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum characters per chunk
    pub chunk_size: usize,
    /// Characters shared between neighbouring chunks
    pub chunk_overlap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            db_path: None,
            bind_addr: "127.0.0.1:8501".to_string(),
            prompt_path: PathBuf::from("prompts/rag.jinja2"),
            top_k: 5,
            surface_idle_secs: 3600,
            llm: LlmConfig::default(),
            vector_store: VectorStoreConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            base_url: LlmConfig::default_base_url("gemini").to_string(),
            chat_model: "gemini-2.5-flash".to_string(),
            embedding_model: "models/gemini-embedding-001".to_string(),
            api_key: None,
        }
    }
}

impl LlmConfig {
    pub fn default_base_url(provider: &str) -> &'static str {
        match provider {
            "ollama" => "http://localhost:11434",
            "openai" => "https://api.openai.com",
            _ => "https://generativelanguage.googleapis.com",
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: "weaviate".to_string(),
            url: "http://localhost:8080".to_string(),
            api_key: None,
            index_name: "Documents".to_string(),
            text_key: "text".to_string(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("RAG_CHAT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("RAG_CHAT_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }
        if let Ok(addr) = std::env::var("RAG_CHAT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(path) = std::env::var("RAG_CHAT_PROMPT_PATH") {
            config.prompt_path = PathBuf::from(path);
        }
        if let Ok(val) = std::env::var("RAG_CHAT_TOP_K") {
            if let Ok(v) = val.parse() {
                config.top_k = v;
            }
        }
        if let Ok(val) = std::env::var("RAG_CHAT_SURFACE_IDLE_SECS") {
            if let Ok(v) = val.parse() {
                config.surface_idle_secs = v;
            }
        }

        // LLM config
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.base_url = LlmConfig::default_base_url(&provider).to_string();
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(model) = std::env::var("LLM_MODEL_NAME") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("EMBEDDINGS_MODEL_NAME") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            if !key.is_empty() {
                config.llm.api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            if !key.is_empty() {
                config.llm.api_key = Some(key);
            }
        }

        // Vector store config
        if let Ok(backend) = std::env::var("VECTOR_STORE_BACKEND") {
            config.vector_store.backend = backend;
        }
        if let Ok(url) = std::env::var("WEAVIATE_URL") {
            if !url.is_empty() {
                config.vector_store.url = url.trim_end_matches('/').to_string();
            }
        }
        if let Ok(key) = std::env::var("WEAVIATE_API_KEY") {
            if !key.is_empty() {
                config.vector_store.api_key = Some(key);
            }
        }
        if let Ok(name) = std::env::var("VECTOR_INDEX_NAME") {
            config.vector_store.index_name = name;
        }
        if let Ok(key) = std::env::var("VECTOR_TEXT_KEY") {
            config.vector_store.text_key = key;
        }

        // Ingestion config
        if let Ok(val) = std::env::var("CHUNK_SIZE") {
            if let Ok(v) = val.parse() {
                config.ingest.chunk_size = v;
            }
        }
        if let Ok(val) = std::env::var("CHUNK_OVERLAP") {
            if let Ok(v) = val.parse() {
                config.ingest.chunk_overlap = v;
            }
        }

        config
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("chat_history.db"))
    }

    pub fn vector_path(&self) -> PathBuf {
        self.data_dir.join("vectors.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documents_index() {
        let config = Config::default();
        assert_eq!(config.vector_store.index_name, "Documents");
        assert_eq!(config.vector_store.text_key, "text");
        assert_eq!(config.top_k, 5);
        assert_eq!(config.ingest.chunk_size, 1000);
        assert_eq!(config.ingest.chunk_overlap, 200);
    }

    #[test]
    fn test_db_path_defaults_into_data_dir() {
        let config = Config {
            data_dir: PathBuf::from("/tmp/rag"),
            ..Config::default()
        };
        assert_eq!(config.db_path(), PathBuf::from("/tmp/rag/chat_history.db"));

        let config = Config {
            db_path: Some(PathBuf::from("/var/lib/chat.db")),
            ..config
        };
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/chat.db"));
    }

    #[test]
    fn test_default_base_url_per_provider() {
        assert_eq!(LlmConfig::default_base_url("ollama"), "http://localhost:11434");
        assert_eq!(LlmConfig::default_base_url("openai"), "https://api.openai.com");
        assert!(LlmConfig::default_base_url("gemini").contains("googleapis"));
    }
}
