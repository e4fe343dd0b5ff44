use std::{collections::HashMap, sync::Arc};

use axum::{Extension, extract::Query, response::Html};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::management::TokenManager;

/// Shared between the callback handler and the command waiting on it.
pub struct CallbackState {
    pub tenant_id: String,
    pub tokens: TokenManager,
    /// `Some(Ok(()))` once the code was exchanged, `Some(Err(..))` on failure.
    pub outcome: Mutex<Option<Result<(), String>>>,
}

impl CallbackState {
    pub fn new(tenant_id: impl Into<String>, tokens: TokenManager) -> Arc<Self> {
        Arc::new(Self {
            tenant_id: tenant_id.into(),
            tokens,
            outcome: Mutex::new(None),
        })
    }

    pub async fn outcome(&self) -> Option<Result<(), String>> {
        self.outcome.lock().await.clone()
    }

    async fn finish(&self, outcome: Result<(), String>) {
        *self.outcome.lock().await = Some(outcome);
    }
}

pub async fn callback(
    Query(params): Query<HashMap<String, String>>,
    Extension(shared): Extension<Arc<CallbackState>>,
) -> Html<&'static str> {
    if let Some(reason) = params.get("error") {
        warn!(tenant_id = %shared.tenant_id, reason = %reason, "authorization denied");
        shared.finish(Err(format!("authorization denied: {reason}"))).await;
        return Html("<h4>Authorization denied.</h4>");
    }

    let (Some(code), Some(state)) = (params.get("code"), params.get("state")) else {
        return Html("<h4>Missing authorization code or state.</h4>");
    };

    match shared
        .tokens
        .complete_authorization(&shared.tenant_id, code, state)
        .await
    {
        Ok(_) => {
            info!(tenant_id = %shared.tenant_id, "authorization completed");
            shared.finish(Ok(())).await;
            Html("<h2>Authentication successful.</h2><p>Close the browser window.</p>")
        }
        Err(e) => {
            warn!(tenant_id = %shared.tenant_id, error = %e, "authorization failed");
            shared.finish(Err(e.to_string())).await;
            Html("<h4>Login failed.</h4>")
        }
    }
}
