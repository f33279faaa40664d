//! Stateless chat relay server.
//!
//! Issues capability tokens binding a caller to a freshly provisioned
//! assistant/vector-store pair, relays streaming chat completions from the
//! upstream provider, and binds uploaded files to a vector store — all
//! without any server-side session storage.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

mod config;
mod identity;
mod relay;
mod search;
mod server;
mod state;
mod upload;

pub use config::Config;
pub use server::build_router;
pub use state::AppState;

#[derive(Debug, Parser)]
pub struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8585")]
    pub listen: SocketAddr,
}

pub async fn run_main(args: Args) -> anyhow::Result<()> {
    let config = Config::from_env();
    if config.auth_secret.is_empty() {
        // Keep serving (chat and raw-id uploads still work) but make the
        // misconfiguration loud; token issuance will fail closed.
        tracing::warn!("RELAY_AUTH_SECRET is not set; capability tokens cannot be issued");
    }

    let state = Arc::new(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
