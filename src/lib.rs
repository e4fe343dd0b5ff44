//! Spotify listening-history sync engine.
//!
//! Pulls each tenant's recently played tracks from the Spotify Web API and
//! materializes them as an incrementally updated property graph of tracks,
//! albums, artists, genres and playlists. Every node carries its tenant id and
//! a play history; a per-tenant watermark makes repeated passes idempotent.
//!
//! # Modules
//!
//! - `api` - HTTP endpoints for the local OAuth callback server
//! - `cli` - Command-line interface implementations
//! - `config` - Configuration from environment variables and `.env`
//! - `error` - Error types of the engine
//! - `graph` - Graph store contract plus Neo4j and in-memory backends
//! - `management` - OAuth token lifecycle per tenant
//! - `mapper` - API payloads to flat entity records
//! - `server` - Local HTTP server for OAuth callbacks
//! - `spotify` - Spotify Web API and token endpoint clients
//! - `sync` - The per-tenant synchronization pass and the multi-tenant pool
//! - `types` - Data structures and type definitions
//! - `utils` - PKCE, timestamp and id helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use spotgraph::{
//!     config::Settings,
//!     graph::MemoryGraph,
//!     management::TokenManager,
//!     spotify::{ApiClient, auth::HttpTokenEndpoint},
//!     sync::SyncOrchestrator,
//! };
//!
//! #[tokio::main]
//! async fn main() -> spotgraph::Res<()> {
//!     let settings = Settings::from_env()?;
//!     let graph = Arc::new(MemoryGraph::new());
//!     let endpoint = Arc::new(HttpTokenEndpoint::new(
//!         settings.token_url.clone(),
//!         settings.client_id.clone(),
//!         settings.redirect_uri.clone(),
//!     ));
//!     let tokens = TokenManager::new(endpoint, graph.clone(), settings.oauth());
//!     let api = Arc::new(ApiClient::new(settings.api_url.clone()));
//!     let orchestrator = SyncOrchestrator::new(api, graph.clone(), graph, tokens);
//!     orchestrator.sync_tenant("alice", None).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod management;
pub mod mapper;
pub mod server;
pub mod spotify;
pub mod sync;
pub mod types;
pub mod utils;

/// A convenient Result type alias for the command-line layer.
///
/// Boxes any error while keeping `Send + Sync` for async contexts. The engine
/// itself returns [`error::SyncError`].
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Console line with a blue `o` marker.
///
/// ```ignore
/// info!("Synchronizing {} tenant(s)", count);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Console line with a green check mark.
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Console line with a red `!`, then exits with status 1.
///
/// Only for the command-line layer: engine code returns errors instead.
///
/// ```ignore
/// let settings = match Settings::from_env() {
///     Ok(s) => s,
///     Err(e) => error!("Invalid configuration. Err: {}", e),
/// };
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Console line with a yellow `!` for recoverable problems.
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
