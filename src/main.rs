use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rag_chat::api;
use rag_chat::chunking::RecursiveSplitter;
use rag_chat::config::Config;
use rag_chat::ingest::Ingestor;
use rag_chat::llm::HttpEmbedder;
use rag_chat::search::open_index;
use rag_chat::state::AppState;

#[derive(Parser)]
#[command(name = "rag-chat", version, about = "Retrieval-augmented chat over your documents")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the chat server (default)
    Serve,
    /// Load, split, embed and store documents matching a glob
    Ingest {
        #[arg(default_value = "documents/*.pdf")]
        pattern: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment alone is enough.
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);
    tracing::info!(
        "Vector store: {} ({})",
        config.vector_store.backend,
        config.vector_store.index_name
    );

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Ingest { pattern } => ingest(config, &pattern).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let state = AppState::new(config.clone()).await?;
    let store = state.store.clone();
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    Ok(())
}

async fn ingest(config: Config, pattern: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.data_dir)?;

    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(std::time::Duration::from_secs(120))
        .build()?;

    let splitter = RecursiveSplitter::new(config.ingest.chunk_size, config.ingest.chunk_overlap)?;
    let index = open_index(&config, client.clone())?;
    let embedder = Arc::new(HttpEmbedder::new(client, config.llm.clone()));

    let ingestor = Ingestor::new(embedder, index, splitter);
    match ingestor.ingest(pattern).await {
        Ok(report) => {
            tracing::info!(
                "Ingested {} files ({} documents, {} chunks)",
                report.files,
                report.documents,
                report.chunks
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Ingestion aborted: {e}");
            Err(e.into())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
