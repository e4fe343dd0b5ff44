use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{error::HttpError, types::Secret};

use super::{RECENTLY_PLAYED_PAGE_SIZE, ResourceKind, ResourceRef, SpotifyApi};

/// Web API client issuing bearer-authenticated `GET` requests.
///
/// Holds no credentials of its own; the access token is passed per call so a
/// single client can serve many tenants.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Resolves the request URL for a resource.
    pub fn endpoint(&self, kind: ResourceKind, target: &ResourceRef) -> Result<String, HttpError> {
        let base = &self.base_url;
        let url = match (kind, target) {
            (ResourceKind::RecentlyPlayed, _) => format!("{base}/me/player/recently-played"),
            (_, ResourceRef::Url(url)) => url.clone(),
            (ResourceKind::Album, ResourceRef::Id(id)) => format!("{base}/albums/{id}"),
            (ResourceKind::Artist, ResourceRef::Id(id)) => format!("{base}/artists/{id}"),
            (ResourceKind::Playlist, ResourceRef::Id(id)) => format!("{base}/playlists/{id}"),
            (ResourceKind::User, ResourceRef::Id(id)) => format!("{base}/users/{id}"),
            (ResourceKind::User, ResourceRef::Current) => format!("{base}/me"),
            (other, ResourceRef::Current) => return Err(HttpError::MissingTarget(other.as_str())),
        };
        Ok(url)
    }
}

#[async_trait]
impl SpotifyApi for ApiClient {
    async fn fetch(
        &self,
        access_token: &Secret,
        kind: ResourceKind,
        target: &ResourceRef,
    ) -> Result<Value, HttpError> {
        let url = self.endpoint(kind, target)?;
        debug!(kind = kind.as_str(), %url, "fetching resource");

        let mut request = self.http.get(&url).bearer_auth(access_token.expose());
        if kind == ResourceKind::RecentlyPlayed {
            request = request.query(&[("limit", RECENTLY_PLAYED_PAGE_SIZE)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(kind = kind.as_str(), status = status.as_u16(), %body, "resource request failed");
            return Err(HttpError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| HttpError::Decode(e.to_string()))
    }
}
