use std::fmt;

use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// A credential that is wiped from memory when dropped.
///
/// Debug and Display never print the wrapped value.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        let mut bytes = std::mem::take(&mut self.0).into_bytes();
        bytes.iter_mut().for_each(|b| *b = 0);
        std::hint::black_box(&bytes);
    }
}

/// Result of a successful token exchange.
#[derive(Debug, Clone)]
pub struct Token {
    pub access_token: Secret,
    pub refresh_token: Secret,
    pub scope: String,
    pub expires_in: u64,
    pub obtained_at: u64,
}

/// Raw token endpoint response body.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Authorization URL plus the verifier the caller must keep for the exchange.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub code_verifier: String,
}

/// Per-tenant configuration record as stored in the graph.
///
/// The refresh token is held as a [`Secret`]: redacted in Debug output and
/// wiped when the record is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantConfig {
    pub tenant_id: String,
    pub last_sync_watermark: i64,
    pub refresh_token: Secret,
    pub refresh_token_expired: bool,
}

/// Reference to another entity as it appears nested in a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityLink {
    pub id: String,
    pub url: String,
}

/// What the user was browsing when playback started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackContext {
    pub kind: String,
    pub url: String,
    pub id: String,
}

impl PlaybackContext {
    pub fn is_playlist(&self) -> bool {
        self.kind == "playlist"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackRecord {
    pub id: String,
    pub name: String,
    pub popularity: i64,
    pub played_at: String,
    pub context: PlaybackContext,
    pub preview_url: String,
    pub album: EntityLink,
    pub artists: Vec<EntityLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumRecord {
    pub name: String,
    pub popularity: i64,
    pub image_url: String,
    pub genres: Vec<String>,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtistRecord {
    pub id: String,
    pub name: String,
    pub popularity: i64,
    pub genres: Vec<String>,
    pub image_url: String,
    pub num_followers: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistRecord {
    pub name: String,
    pub description: String,
    pub num_followers: i64,
    pub image_url: String,
    pub owner_name: String,
}

/// An entity that could not be written during a pass, kept for backfill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct SkippedEntity {
    pub kind: String,
    pub id: String,
    pub reason: String,
}

#[derive(Tabled)]
pub struct NodeCountRow {
    pub label: String,
    pub total: u64,
}

#[derive(Tabled)]
pub struct TenantResultRow {
    pub tenant: String,
    pub outcome: String,
    pub applied: usize,
    pub skipped: usize,
}
