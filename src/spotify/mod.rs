//! # Spotify Module
//!
//! Integration with the Spotify Web API and accounts service.
//!
//! ## Modules
//!
//! - [`client`] - authenticated `GET` requests for the resources the sync
//!   pass reads (recently played, albums, artists, playlists, the current user)
//! - [`auth`] - the OAuth 2.0 token endpoint (PKCE code exchange and refresh)
//!   and authorization URL construction
//!
//! Both seams are traits ([`SpotifyApi`], [`auth::TokenEndpoint`]) so the
//! orchestrator can be driven by in-process fakes in tests.
//!
//! ## Error Handling
//!
//! Resource requests never propagate a transport failure as a panic: every
//! non-200 response becomes an [`HttpError`] value and the caller decides
//! whether to skip the entity or abort the pass.

use async_trait::async_trait;
use serde_json::Value;

use crate::{error::HttpError, types::Secret};

pub mod auth;
pub mod client;

pub use client::ApiClient;

/// Maximum number of events returned by one recently-played request.
pub const RECENTLY_PLAYED_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    RecentlyPlayed,
    Album,
    Artist,
    Playlist,
    User,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::RecentlyPlayed => "recently_played",
            ResourceKind::Album => "album",
            ResourceKind::Artist => "artist",
            ResourceKind::Playlist => "playlist",
            ResourceKind::User => "user",
        }
    }
}

/// How a resource is addressed: by id, by a full URL handed out by the API
/// (pagination links, `href` fields), or implicitly for `me` endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    Id(String),
    Url(String),
    Current,
}

impl ResourceRef {
    /// Prefers the id and falls back to the URL when the id is empty.
    pub fn id_or_url(id: &str, url: &str) -> Self {
        if !id.is_empty() {
            ResourceRef::Id(id.to_string())
        } else if !url.is_empty() {
            ResourceRef::Url(url.to_string())
        } else {
            ResourceRef::Current
        }
    }

    /// Prefers the URL and falls back to the id when the URL is empty.
    pub fn url_or_id(url: &str, id: &str) -> Self {
        if !url.is_empty() {
            ResourceRef::Url(url.to_string())
        } else {
            ResourceRef::id_or_url(id, "")
        }
    }
}

#[async_trait]
pub trait SpotifyApi: Send + Sync {
    async fn fetch(
        &self,
        access_token: &Secret,
        kind: ResourceKind,
        target: &ResourceRef,
    ) -> Result<Value, HttpError>;
}
