//! # CLI Module
//!
//! User-facing commands of `spotgraph`. Each command wires the engine from
//! [`Settings`], runs one operation and reports with the console macros
//! (`info!`, `success!`, `warning!`, `error!`). `error!` ends the process, so
//! it is only used here and never in the engine.
//!
//! ## Commands
//!
//! - [`auth`] - PKCE authorization of a tenant through the local callback server
//! - [`sync`] - one pass for the given tenants, or for every known tenant
//! - [`delete_tenant`] - removes every node of a tenant
//! - [`stats`] - node counts per label for a tenant
//!
//! ## Typical session
//!
//! ```bash
//! spotgraph auth --tenant alice        # authorize once
//! spotgraph sync --tenant alice        # pull recently played into the graph
//! spotgraph sync --all --workers 8     # every tenant with a config record
//! spotgraph stats --tenant alice
//! ```

use std::sync::Arc;

use crate::{
    config::Settings,
    error::SyncError,
    graph::Neo4jStore,
    management::TokenManager,
    spotify::{ApiClient, auth::HttpTokenEndpoint},
    sync::SyncOrchestrator,
};

mod auth;
mod sync;
mod tenant;

pub use auth::auth;
pub use sync::sync;
pub use tenant::delete_tenant;
pub use tenant::stats;

/// Connects to the graph and assembles the production orchestrator.
pub async fn orchestrator(settings: &Settings) -> Result<SyncOrchestrator, SyncError> {
    let store = Arc::new(
        Neo4jStore::connect(
            &settings.neo4j_uri,
            &settings.neo4j_user,
            &settings.neo4j_password,
        )
        .await?,
    );

    let endpoint = Arc::new(HttpTokenEndpoint::new(
        settings.token_url.clone(),
        settings.client_id.clone(),
        settings.redirect_uri.clone(),
    ));
    let tokens = TokenManager::new(endpoint, store.clone(), settings.oauth());
    let api = Arc::new(ApiClient::new(settings.api_url.clone()));

    Ok(SyncOrchestrator::new(api, store.clone(), store, tokens))
}
