//! Boots the paper RAG composition root and idles, hosting structured logs.
//!
//! There is no HTTP routing layer in this crate (spec.md §1: out of scope); this
//! binary exists to prove [`RagContext`] initializes cleanly against real
//! configuration and to host the process's structured logs.

use paper_rag::{RagConfig, RagContext};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => RagConfig::from_file(path)?,
        None => RagConfig::default(),
    };

    let _ctx = RagContext::new(config).await?;
    tracing::info!("paper-rag-daemon ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}
