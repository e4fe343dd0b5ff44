use std::time::{Duration, Instant};

use chrono::Utc;

use crate::{
    api::CallbackState,
    config::Settings,
    error, info, server, success, warning,
};

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Authorizes a tenant: starts the callback server, opens the browser on the
/// authorization URL and waits for the redirect.
pub async fn auth(settings: &Settings, tenant_id: &str) {
    let orchestrator = match super::orchestrator(settings).await {
        Ok(o) => o,
        Err(e) => error!("Cannot connect to graph. Err: {}", e),
    };
    let tokens = orchestrator.tokens().clone();

    let listener = match server::bind(&settings.server_address).await {
        Ok(l) => l,
        Err(e) => error!("Cannot start callback server. Err: {}", e),
    };
    let shared = CallbackState::new(tenant_id, tokens.clone());
    let server_state = shared.clone();
    let server = tokio::spawn(async move { server::start_api_server(listener, server_state).await });

    let url = match tokens
        .begin_authorization(tenant_id, Utc::now().timestamp())
        .await
    {
        Ok(url) => url,
        Err(e) => error!("Cannot start authorization. Err: {}", e),
    };

    info!("Authorizing tenant {}", tenant_id);
    if webbrowser::open(&url).is_err() {
        warning!(
            "Failed to open browser. Please navigate to the following URL manually:\n{}",
            url
        )
    }

    let outcome = wait_for_callback(&shared).await;
    server.abort();

    match outcome {
        Some(Ok(())) => success!("Authentication successful for tenant {}!", tenant_id),
        Some(Err(e)) => error!("Authentication failed. Err: {}", e),
        None => error!("Authentication timed out."),
    }
}

async fn wait_for_callback(shared: &CallbackState) -> Option<Result<(), String>> {
    let start = Instant::now();

    while start.elapsed() < CALLBACK_TIMEOUT {
        if let Some(outcome) = shared.outcome().await {
            return Some(outcome);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    None
}
