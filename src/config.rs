//! Configuration management for the listening-history sync engine.
//!
//! Values come from environment variables, optionally seeded from a `.env`
//! file in the local data directory. The lookup order is:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Application defaults (where applicable)
//!
//! Everything is read once into [`Settings`]; nothing else in the crate touches
//! the process environment.

use std::{env, path::PathBuf};

use crate::{error::SyncError, spotify::auth::OAuthSettings};

pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_SCOPE: &str = "playlist-read-private playlist-read-collaborative user-read-recently-played user-read-private user-read-email";
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:8501";
pub const DEFAULT_WORKERS: usize = 4;

/// Returns the directory holding the `.env` file.
///
/// - Linux: `~/.local/share/spotgraph`
/// - macOS: `~/Library/Application Support/spotgraph`
/// - Windows: `%LOCALAPPDATA%/spotgraph`
pub fn data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("spotgraph");
    path
}

/// Loads environment variables from `<data_local_dir>/spotgraph/.env`.
///
/// Creates the directory if needed. A missing `.env` file is not an error, so
/// a fully exported environment works on its own. A file that exists but
/// cannot be parsed is reported.
///
/// # Example
///
/// ```no_run
/// use spotgraph::config;
///
/// #[tokio::main]
/// async fn main() {
///     if let Err(e) = config::load_env().await {
///         eprintln!("Configuration error: {}", e);
///     }
/// }
/// ```
pub async fn load_env() -> Result<(), SyncError> {
    let dir = data_dir();
    async_fs::create_dir_all(&dir)
        .await
        .map_err(|e| SyncError::Config(format!("cannot create {}: {e}", dir.display())))?;

    let path = dir.join(".env");
    if !path.is_file() {
        return Ok(());
    }

    dotenv::from_path(&path)
        .map_err(|e| SyncError::Config(format!("cannot load {}: {e}", path.display())))?;
    Ok(())
}

/// Runtime settings of the engine and its command-line front end.
#[derive(Debug, Clone)]
pub struct Settings {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub auth_url: String,
    pub token_url: String,
    pub api_url: String,
    pub server_address: String,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub workers: usize,
}

impl Settings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] naming the first required variable that is
    /// missing or empty, or a malformed `SPOTGRAPH_WORKERS`.
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            value(key).ok_or_else(|| SyncError::Config(format!("{key} must be set")))
        };
        let or_default = |key: &str, default: &str| value(key).unwrap_or_else(|| default.to_string());

        let workers = match value("SPOTGRAPH_WORKERS") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|w| *w > 0)
                .ok_or_else(|| {
                    SyncError::Config(format!("SPOTGRAPH_WORKERS must be a positive integer, got {raw:?}"))
                })?,
            None => DEFAULT_WORKERS,
        };

        Ok(Self {
            client_id: required("SPOTIFY_API_AUTH_CLIENT_ID")?,
            redirect_uri: required("SPOTIFY_API_REDIRECT_URI")?,
            scope: or_default("SPOTIFY_API_AUTH_SCOPE", DEFAULT_SCOPE),
            auth_url: or_default("SPOTIFY_API_AUTH_URL", DEFAULT_AUTH_URL),
            token_url: or_default("SPOTIFY_API_TOKEN_URL", DEFAULT_TOKEN_URL),
            api_url: or_default("SPOTIFY_API_URL", DEFAULT_API_URL),
            server_address: or_default("SERVER_ADDRESS", DEFAULT_SERVER_ADDRESS),
            neo4j_uri: required("NEO4J_URI")?,
            neo4j_user: required("NEO4J_USER")?,
            neo4j_password: required("NEO4J_PASSWORD")?,
            workers,
        })
    }

    pub fn oauth(&self) -> OAuthSettings {
        OAuthSettings {
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            scope: self.scope.clone(),
            auth_url: self.auth_url.clone(),
        }
    }
}
