//! # API Module
//!
//! HTTP endpoints of the local OAuth callback server used by `spotgraph auth`.
//!
//! ## Endpoints
//!
//! - [`callback`] - receives the authorization redirect, checks the `state`
//!   nonce against the one stored on the tenant's configuration record and
//!   exchanges the code (PKCE) for a refresh token
//! - [`health`] - liveness probe with the crate version
//!
//! Handlers share a [`CallbackState`] through an axum `Extension`; the CLI
//! polls it to learn when the handshake has finished.

mod callback;
mod health;

pub use callback::CallbackState;
pub use callback::callback;
pub use health::health;
