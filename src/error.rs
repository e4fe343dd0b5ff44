//! Error taxonomy for the synchronization engine.
//!
//! Each external boundary has its own error type so callers can decide how to
//! react: token endpoint failures ([`AuthError`]) force a re-authorization,
//! resource fetch failures ([`HttpError`]) skip a single entity, and graph
//! failures ([`BackendError`]) either skip a mutation or abort the tenant's
//! pass depending on whether the backend is still reachable.

use thiserror::Error;

/// Failures of the OAuth token endpoint or of the authorization handshake.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("token exchange rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("token endpoint unreachable: {0}")]
    Transport(String),

    #[error("malformed token response: {0}")]
    Decode(String),

    #[error("neither an authorization code nor a refresh token was supplied")]
    MissingGrant,

    #[error("authorization code supplied without its PKCE code verifier")]
    MissingVerifier,

    #[error("oauth state mismatch, possible CSRF attempt")]
    StateMismatch,

    #[error("no pending authorization for tenant {0}")]
    NoPendingAuthorization(String),
}

/// Failures of an authenticated resource request against the Web API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed payload: {0}")]
    Decode(String),

    #[error("no id or url given for {0} request")]
    MissingTarget(&'static str),
}

/// Failures of the graph backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend cannot be reached at all. Aborts the tenant's pass.
    #[error("graph backend unavailable: {0}")]
    Unavailable(String),

    /// A single statement failed. The mutation is skipped and recorded.
    #[error("graph statement failed: {0}")]
    Statement(String),
}

impl BackendError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }
}

/// Umbrella error returned by the engine's public operations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("tenant {0} not found")]
    TenantNotFound(String),

    #[error("no configuration record for tenant {0}")]
    ConfigMissing(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("sync worker for tenant {tenant_id} failed: {reason}")]
    Worker { tenant_id: String, reason: String },
}
