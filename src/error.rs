use std::path::PathBuf;

/// Errors raised anywhere between document discovery and answer generation.
///
/// HTTP clients build their failures with `anyhow` context chains; those are
/// flattened into the message of the matching variant at the trait boundary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load documents: {0}")]
    Load(String),

    #[error("failed to split documents: {0}")]
    Split(String),

    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("vector index error: {0}")]
    Index(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("prompt template error: {0}")]
    Template(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Session persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("session database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored messages are not valid JSON: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("invalid session timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("failed to prepare database directory {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn embedding(e: anyhow::Error) -> Self {
        Self::Embedding(format!("{e:#}"))
    }

    pub(crate) fn index(e: anyhow::Error) -> Self {
        Self::Index(format!("{e:#}"))
    }

    pub(crate) fn generation(e: anyhow::Error) -> Self {
        Self::Generation(format!("{e:#}"))
    }
}
