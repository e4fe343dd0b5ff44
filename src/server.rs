use std::{net::SocketAddr, str::FromStr, sync::Arc};

use axum::{Extension, Router, routing::get};
use tokio::net::TcpListener;
use tracing::info;

use crate::{
    api::{self, CallbackState},
    error::SyncError,
};

pub fn router(state: Arc<CallbackState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/callback", get(api::callback).layer(Extension(state)))
}

/// Binds the callback server. Returns the listener so the caller knows the
/// bound address before serving.
pub async fn bind(address: &str) -> Result<TcpListener, SyncError> {
    let addr = SocketAddr::from_str(address)
        .map_err(|e| SyncError::Config(format!("invalid server address {address:?}: {e}")))?;
    TcpListener::bind(addr)
        .await
        .map_err(|e| SyncError::Config(format!("cannot bind {addr}: {e}")))
}

pub async fn start_api_server(listener: TcpListener, state: Arc<CallbackState>) -> Result<(), SyncError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "callback server listening");
    }
    axum::serve(listener, router(state))
        .await
        .map_err(|e| SyncError::Config(format!("callback server stopped: {e}")))
}
