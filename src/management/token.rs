use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    error::{AuthError, SyncError},
    graph::TokenStore,
    spotify::auth::{Grant, OAuthSettings, TokenEndpoint, authorization_url},
    types::{AuthorizationRequest, Secret, Token},
    utils,
};

/// Result of the pre-sync token check.
#[derive(Debug)]
pub enum TokenStatus {
    /// A fresh access token, valid for the coming pass.
    Fresh(Secret),
    /// No usable refresh token; the tenant must re-authorize.
    Expired,
}

/// Owns acquisition and renewal of a tenant's access tokens.
#[derive(Clone)]
pub struct TokenManager {
    endpoint: Arc<dyn TokenEndpoint>,
    store: Arc<dyn TokenStore>,
    oauth: OAuthSettings,
}

impl TokenManager {
    pub fn new(
        endpoint: Arc<dyn TokenEndpoint>,
        store: Arc<dyn TokenStore>,
        oauth: OAuthSettings,
    ) -> Self {
        Self {
            endpoint,
            store,
            oauth,
        }
    }

    /// Builds the authorization URL for a caller-supplied state nonce and a
    /// freshly generated PKCE verifier.
    pub fn authorization_request(&self, state: &str) -> Result<AuthorizationRequest, AuthError> {
        let code_verifier = utils::generate_code_verifier();
        let code_challenge = utils::generate_code_challenge(&code_verifier);
        let url = authorization_url(&self.oauth, state, &code_challenge)?;
        Ok(AuthorizationRequest { url, code_verifier })
    }

    /// Starts an authorization for the tenant: stores a new state nonce and
    /// verifier on its config record and returns the URL to visit.
    pub async fn begin_authorization(&self, tenant_id: &str, now: i64) -> Result<String, SyncError> {
        self.store
            .ensure_config(tenant_id, now - utils::INITIAL_LOOKBACK_SECS)
            .await?;

        let state = utils::generate_state();
        let request = self.authorization_request(&state)?;
        self.store
            .store_oauth_state(tenant_id, &state, &request.code_verifier)
            .await?;

        info!(tenant_id, "authorization started");
        Ok(request.url)
    }

    /// Finishes an authorization from the redirect's `code` and `state`.
    ///
    /// The pending state/verifier pair is consumed whether or not it matches.
    pub async fn complete_authorization(
        &self,
        tenant_id: &str,
        code: &str,
        state: &str,
    ) -> Result<Token, SyncError> {
        let Some((expected_state, code_verifier)) = self.store.take_oauth_state(tenant_id).await?
        else {
            return Err(AuthError::NoPendingAuthorization(tenant_id.to_string()).into());
        };

        if expected_state != state {
            warn!(tenant_id, "oauth state mismatch");
            return Err(AuthError::StateMismatch.into());
        }

        let grant = Grant::from_parts(Some(code.to_string()), Some(code_verifier), None)?;
        self.exchange_token(tenant_id, &grant).await
    }

    /// Performs the token exchange and, on success, persists the refresh token
    /// and clears the expiry flag. A rejected exchange changes nothing.
    pub async fn exchange_token(&self, tenant_id: &str, grant: &Grant) -> Result<Token, SyncError> {
        let token = self.endpoint.exchange(grant).await?;

        self.store
            .store_refresh_token(tenant_id, token.refresh_token.expose())
            .await?;
        self.store
            .store_refresh_token_expired(tenant_id, false)
            .await?;

        info!(tenant_id, grant_type = grant.grant_type(), "token exchanged");
        Ok(token)
    }

    /// Makes sure the tenant has a config record and a working refresh token.
    ///
    /// A missing refresh token or a rejected refresh marks the tenant expired.
    /// Transport failures are returned as errors and leave the flag untouched.
    pub async fn check_and_refresh(
        &self,
        tenant_id: &str,
        now: i64,
    ) -> Result<TokenStatus, SyncError> {
        if self
            .store
            .ensure_config(tenant_id, now - utils::INITIAL_LOOKBACK_SECS)
            .await?
        {
            info!(tenant_id, "created configuration record");
        }

        let config = self
            .store
            .load_config(tenant_id)
            .await?
            .ok_or_else(|| SyncError::ConfigMissing(tenant_id.to_string()))?;

        let stored = config.refresh_token;
        if stored.is_empty() {
            info!(tenant_id, "no refresh token stored");
            self.store
                .store_refresh_token_expired(tenant_id, true)
                .await?;
            return Ok(TokenStatus::Expired);
        }

        match self
            .exchange_token(tenant_id, &Grant::RefreshToken(stored))
            .await
        {
            Ok(token) => Ok(TokenStatus::Fresh(token.access_token.clone())),
            Err(SyncError::Auth(AuthError::Rejected { status, .. })) => {
                warn!(tenant_id, status, "refresh token rejected");
                self.store
                    .store_refresh_token_expired(tenant_id, true)
                    .await?;
                Ok(TokenStatus::Expired)
            }
            Err(e) => Err(e),
        }
    }
}
