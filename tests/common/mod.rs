#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::DateTime;
use serde_json::{Value, json};

use spotgraph::{
    error::{AuthError, HttpError},
    graph::{MemoryGraph, TokenStore},
    management::TokenManager,
    spotify::{
        ResourceKind, ResourceRef, SpotifyApi,
        auth::{Grant, OAuthSettings, TokenEndpoint},
    },
    sync::{ProgressSink, SyncOrchestrator},
    types::{Secret, Token},
    utils::INITIAL_LOOKBACK_SECS,
};

pub const STARTED_AT: i64 = 1_700_000_000;
pub const T0: i64 = STARTED_AT - INITIAL_LOOKBACK_SECS;
pub const ACCESS_TOKEN: &str = "access-token";
pub const REFRESH_TOKEN: &str = "refresh-token";

pub fn played_at(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .unwrap()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

pub fn oauth_settings() -> OAuthSettings {
    OAuthSettings {
        client_id: "client-123".to_string(),
        redirect_uri: "http://127.0.0.1:8501/callback".to_string(),
        scope: "user-read-recently-played".to_string(),
        auth_url: "https://accounts.example.com/authorize".to_string(),
    }
}

/// Web API double serving canned payloads per resource.
#[derive(Default)]
pub struct FakeApi {
    responses: Mutex<HashMap<(ResourceKind, ResourceRef), Result<Value, HttpError>>>,
    calls: Mutex<Vec<(ResourceKind, ResourceRef)>>,
    tokens_seen: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn respond(&self, kind: ResourceKind, target: ResourceRef, payload: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert((kind, target), Ok(payload));
    }

    pub fn fail(&self, kind: ResourceKind, target: ResourceRef, status: u16) {
        self.responses.lock().unwrap().insert(
            (kind, target),
            Err(HttpError::Status {
                status,
                body: "upstream error".to_string(),
            }),
        );
    }

    pub fn feed(&self, events: Vec<Value>) {
        self.respond(
            ResourceKind::RecentlyPlayed,
            ResourceRef::Current,
            json!({ "items": events, "limit": 50 }),
        );
    }

    pub fn calls(&self) -> Vec<(ResourceKind, ResourceRef)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, kind: ResourceKind) -> usize {
        self.calls().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpotifyApi for FakeApi {
    async fn fetch(
        &self,
        access_token: &Secret,
        kind: ResourceKind,
        target: &ResourceRef,
    ) -> Result<Value, HttpError> {
        self.calls.lock().unwrap().push((kind, target.clone()));
        self.tokens_seen
            .lock()
            .unwrap()
            .push(access_token.expose().to_string());
        self.responses
            .lock()
            .unwrap()
            .get(&(kind, target.clone()))
            .cloned()
            .unwrap_or(Err(HttpError::Status {
                status: 404,
                body: "not found".to_string(),
            }))
    }
}

/// Token endpoint double. Accepts any grant unless told to reject.
#[derive(Default)]
pub struct FakeTokenEndpoint {
    reject_with: Mutex<Option<AuthError>>,
    calls: AtomicUsize,
    grants: Mutex<Vec<String>>,
}

impl FakeTokenEndpoint {
    pub fn reject(&self, error: AuthError) {
        *self.reject_with.lock().unwrap() = Some(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn grants(&self) -> Vec<String> {
        self.grants.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenEndpoint for FakeTokenEndpoint {
    async fn exchange(&self, grant: &Grant) -> Result<Token, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.grants
            .lock()
            .unwrap()
            .push(grant.grant_type().to_string());

        if let Some(error) = self.reject_with.lock().unwrap().clone() {
            return Err(error);
        }

        let refresh_token = match grant {
            Grant::AuthorizationCode { code, .. } => format!("refresh-for-{code}"),
            Grant::RefreshToken(previous) => previous.expose().to_string(),
        };
        Ok(Token {
            access_token: Secret::new(ACCESS_TOKEN),
            refresh_token: Secret::new(refresh_token),
            scope: "user-read-recently-played".to_string(),
            expires_in: 3600,
            obtained_at: STARTED_AT as u64,
        })
    }
}

#[derive(Default)]
pub struct RecordingSink(pub Mutex<Vec<u8>>);

impl ProgressSink for RecordingSink {
    fn report(&self, percent: u8) {
        self.0.lock().unwrap().push(percent);
    }
}

pub struct Harness {
    pub graph: Arc<MemoryGraph>,
    pub api: Arc<FakeApi>,
    pub endpoint: Arc<FakeTokenEndpoint>,
    pub tokens: TokenManager,
    pub orchestrator: SyncOrchestrator,
}

impl Harness {
    pub fn new() -> Self {
        let graph = Arc::new(MemoryGraph::new());
        let api = Arc::new(FakeApi::default());
        let endpoint = Arc::new(FakeTokenEndpoint::default());
        let tokens = TokenManager::new(endpoint.clone(), graph.clone(), oauth_settings());
        let orchestrator =
            SyncOrchestrator::new(api.clone(), graph.clone(), graph.clone(), tokens.clone());
        Self {
            graph,
            api,
            endpoint,
            tokens,
            orchestrator,
        }
    }

    /// Seeds an authorized tenant whose watermark sits at `T0`.
    pub async fn authorized_tenant(&self, tenant_id: &str) {
        self.graph.ensure_config(tenant_id, T0).await.unwrap();
        self.graph
            .store_refresh_token(tenant_id, REFRESH_TOKEN)
            .await
            .unwrap();
        self.graph
            .store_refresh_token_expired(tenant_id, false)
            .await
            .unwrap();
    }
}

pub fn play_event(track_id: &str, ts: i64, album_id: &str, artist_ids: &[&str], playlist_id: Option<&str>) -> Value {
    let context = match playlist_id {
        Some(id) => json!({
            "type": "playlist",
            "href": format!("https://api.spotify.com/v1/playlists/{id}"),
            "uri": format!("spotify:playlist:{id}"),
        }),
        None => json!({
            "type": "album",
            "href": format!("https://api.spotify.com/v1/albums/{album_id}"),
            "uri": format!("spotify:album:{album_id}"),
        }),
    };
    let artists: Vec<Value> = artist_ids
        .iter()
        .map(|id| json!({ "id": id, "href": format!("https://api.spotify.com/v1/artists/{id}"), "name": id }))
        .collect();

    json!({
        "played_at": played_at(ts),
        "context": context,
        "track": {
            "id": track_id,
            "name": format!("Track {track_id}"),
            "popularity": 42,
            "preview_url": format!("https://p.scdn.co/mp3-preview/{track_id}"),
            "album": {
                "id": album_id,
                "href": format!("https://api.spotify.com/v1/albums/{album_id}"),
            },
            "artists": artists,
        }
    })
}

pub fn album_payload(name: &str, genres: &[&str]) -> Value {
    json!({
        "name": name,
        "popularity": 55,
        "label": "Some Label",
        "genres": genres,
        "images": [{ "url": "https://i.scdn.co/image/album", "height": 640 }],
        "artists": [],
        "tracks": { "items": [] },
    })
}

pub fn artist_payload(id: &str, genres: &[&str]) -> Value {
    json!({
        "id": id,
        "name": format!("Artist {id}"),
        "popularity": 70,
        "genres": genres,
        "followers": { "total": 1234 },
        "images": [{ "url": "https://i.scdn.co/image/artist" }],
    })
}

pub fn playlist_payload(name: &str) -> Value {
    json!({
        "name": name,
        "description": "daily mix",
        "followers": { "total": 9 },
        "images": [],
        "owner": { "display_name": "Spotify", "id": "spotify" },
        "tracks": { "items": [] },
    })
}

pub fn playlist_url(id: &str) -> ResourceRef {
    ResourceRef::Url(format!("https://api.spotify.com/v1/playlists/{id}"))
}
