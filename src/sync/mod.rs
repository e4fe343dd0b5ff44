//! # Sync Module
//!
//! One synchronization pass per tenant, driven as a small state machine:
//!
//! ```text
//! TokenCheck -> Fetching -> PerEventUpsert -> WatermarkCommit -> Done
//!     |             |
//!     v             v
//! Aborted(Expired)  Aborted(APIError)
//! ```
//!
//! Events at or below the tenant's watermark are skipped. Every kept event is
//! written as a set of independent, idempotent mutations (node upserts with a
//! history check and edges guarded by an existence check), so a pass that dies
//! halfway can simply be run again.
//!
//! Failures are contained per facet: a failed album, artist or playlist fetch
//! skips only that entity, and a failed graph statement is recorded in the
//! report's skipped list. Only an unreachable graph backend aborts the pass.
//!
//! [`pool`] runs passes for many tenants on a bounded number of workers.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    error::{BackendError, HttpError, SyncError},
    graph::{Edge, GraphStore, Label, NodeRef, NodeUpsert, Play, Relation, TokenStore, UpsertOutcome},
    management::{TokenManager, TokenStatus},
    mapper,
    spotify::{ResourceKind, ResourceRef, SpotifyApi},
    types::{Secret, SkippedEntity, TrackRecord},
    utils,
};

pub mod pool;

/// Receives pass progress as a percentage of processed events.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    TokenCheck,
    Fetching,
    PerEventUpsert,
    WatermarkCommit,
    Done,
}

#[derive(Debug)]
pub enum SyncOutcome {
    /// The pass ran to completion.
    Done(SyncReport),
    /// The refresh token is missing or was rejected; the tenant must re-authorize.
    Expired,
    /// The recently-played feed itself could not be fetched.
    FeedUnavailable(HttpError),
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Done(report) => Some(report),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub tenant_id: String,
    pub started_at: i64,
    pub events_fetched: usize,
    pub events_applied: usize,
    pub events_below_watermark: usize,
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub edges_created: usize,
    pub watermark: i64,
    pub skipped: Vec<SkippedEntity>,
}

impl SyncReport {
    fn skip(&mut self, kind: &str, id: &str, reason: impl ToString) {
        self.skipped.push(SkippedEntity {
            kind: kind.to_string(),
            id: id.to_string(),
            reason: reason.to_string(),
        });
    }
}

/// Everything a single pass needs about its tenant. Dropping it wipes the
/// access token.
struct TenantContext {
    tenant_id: String,
    access_token: Secret,
    started_at: i64,
}

/// A resolved play: when it happened and the hour-of-day it is filed under.
struct PlayEvent<'a> {
    track: &'a TrackRecord,
    play: Play,
}

#[derive(Clone)]
pub struct SyncOrchestrator {
    api: Arc<dyn SpotifyApi>,
    graph: Arc<dyn GraphStore>,
    store: Arc<dyn TokenStore>,
    tokens: TokenManager,
}

impl SyncOrchestrator {
    pub fn new(
        api: Arc<dyn SpotifyApi>,
        graph: Arc<dyn GraphStore>,
        store: Arc<dyn TokenStore>,
        tokens: TokenManager,
    ) -> Self {
        Self {
            api,
            graph,
            store,
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub async fn sync_tenant(
        &self,
        tenant_id: &str,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<SyncOutcome, SyncError> {
        self.sync_tenant_at(tenant_id, Utc::now().timestamp(), progress)
            .await
    }

    /// Runs one pass as if it started at `started_at` (unix seconds).
    pub async fn sync_tenant_at(
        &self,
        tenant_id: &str,
        started_at: i64,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<SyncOutcome, SyncError> {
        debug!(tenant_id, phase = ?SyncPhase::TokenCheck, "sync phase");
        let access_token = match self.tokens.check_and_refresh(tenant_id, started_at).await? {
            TokenStatus::Fresh(token) => token,
            TokenStatus::Expired => {
                warn!(tenant_id, "refresh token expired, reauthorization required");
                return Ok(SyncOutcome::Expired);
            }
        };

        let ctx = TenantContext {
            tenant_id: tenant_id.to_string(),
            access_token,
            started_at,
        };

        debug!(tenant_id, phase = ?SyncPhase::Fetching, "sync phase");
        let feed = match self
            .api
            .fetch(&ctx.access_token, ResourceKind::RecentlyPlayed, &ResourceRef::Current)
            .await
        {
            Ok(feed) => feed,
            Err(e) => {
                warn!(tenant_id, error = %e, "recently played feed unavailable");
                return Ok(SyncOutcome::FeedUnavailable(e));
            }
        };

        let plays = mapper::map_plays(&feed);
        // Only the watermark is kept; the record (and its refresh token) is dropped here.
        let watermark = self
            .store
            .load_config(tenant_id)
            .await?
            .map(|config| config.last_sync_watermark)
            .ok_or_else(|| SyncError::ConfigMissing(tenant_id.to_string()))?;

        let mut report = SyncReport {
            tenant_id: tenant_id.to_string(),
            started_at,
            events_fetched: plays.len(),
            watermark,
            ..SyncReport::default()
        };

        if plays.is_empty() {
            info!(tenant_id, "no recently played events");
            if let Some(sink) = progress {
                sink.report(100);
            }
            return Ok(SyncOutcome::Done(report));
        }

        debug!(tenant_id, phase = ?SyncPhase::PerEventUpsert, events = plays.len(), "sync phase");
        let total = plays.len();
        // The feed is newest first; apply oldest first so histories stay chronological.
        for (done, track) in plays.iter().rev().enumerate() {
            self.apply_play(&ctx, track, watermark, &mut report)
                .await?;
            if let Some(sink) = progress {
                sink.report(utils::percent(done + 1, total));
            }
        }

        debug!(tenant_id, phase = ?SyncPhase::WatermarkCommit, "sync phase");
        report.watermark = self
            .store
            .advance_watermark(tenant_id, ctx.started_at)
            .await?;

        info!(
            tenant_id,
            applied = report.events_applied,
            below_watermark = report.events_below_watermark,
            nodes_created = report.nodes_created,
            edges_created = report.edges_created,
            skipped = report.skipped.len(),
            watermark = report.watermark,
            "sync pass complete"
        );
        debug!(tenant_id, phase = ?SyncPhase::Done, "sync phase");
        Ok(SyncOutcome::Done(report))
    }

    async fn apply_play(
        &self,
        ctx: &TenantContext,
        track: &TrackRecord,
        watermark: i64,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let Some((played_at, hour)) = utils::convert_timestamp(&track.played_at) else {
            warn!(tenant_id = %ctx.tenant_id, track_id = %track.id, played_at = %track.played_at, "unparseable played_at");
            report.skip("Track", &track.id, format!("unparseable played_at {:?}", track.played_at));
            return Ok(());
        };

        if played_at <= watermark {
            report.events_below_watermark += 1;
            return Ok(());
        }

        debug!(tenant_id = %ctx.tenant_id, track = %track.name, played_at, "applying play");
        report.events_applied += 1;
        let event = PlayEvent {
            track,
            play: Play { played_at, hour },
        };

        let track_node = NodeRef::new(Label::Track, &track.id);
        let upserted = self
            .upsert(ctx, &NodeUpsert::track(track, event.play), report)
            .await?;
        if !upserted {
            return Ok(());
        }

        let album_node = self.apply_album(ctx, &event, &track_node, report).await?;
        self.apply_artists(ctx, &event, &track_node, album_node.as_ref(), report)
            .await?;
        if track.context.is_playlist() {
            self.apply_playlist(ctx, &event, &track_node, report).await?;
        }
        Ok(())
    }

    async fn apply_album(
        &self,
        ctx: &TenantContext,
        event: &PlayEvent<'_>,
        track_node: &NodeRef,
        report: &mut SyncReport,
    ) -> Result<Option<NodeRef>, SyncError> {
        let link = &event.track.album;
        let target = ResourceRef::id_or_url(&link.id, &link.url);
        let Some(payload) = self
            .fetch_facet(ctx, ResourceKind::Album, &target, &link.id, report)
            .await
        else {
            return Ok(None);
        };

        let album = mapper::map_album(&payload);
        let album_id = if link.id.is_empty() {
            utils::id_from_url(&link.url)
        } else {
            link.id.clone()
        };
        if album_id.is_empty() {
            report.skip("Album", "", "album without id");
            return Ok(None);
        }

        if !self
            .upsert(ctx, &NodeUpsert::album(&album_id, &album, event.play), report)
            .await?
        {
            return Ok(None);
        }

        let album_node = NodeRef::new(Label::Album, &album_id);
        self.connect(
            ctx,
            Edge::new(track_node.clone(), Relation::InAlbum, album_node.clone()),
            report,
        )
        .await?;
        self.apply_genres(ctx, &album.genres, &album_node, event.play, report)
            .await?;
        Ok(Some(album_node))
    }

    async fn apply_artists(
        &self,
        ctx: &TenantContext,
        event: &PlayEvent<'_>,
        track_node: &NodeRef,
        album_node: Option<&NodeRef>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        for link in &event.track.artists {
            let target = ResourceRef::id_or_url(&link.id, &link.url);
            let Some(payload) = self
                .fetch_facet(ctx, ResourceKind::Artist, &target, &link.id, report)
                .await
            else {
                continue;
            };

            let artist = mapper::map_artist(&payload);
            let artist_id = [&link.id, &artist.id]
                .into_iter()
                .find(|id| !id.is_empty())
                .cloned()
                .unwrap_or_else(|| utils::id_from_url(&link.url));
            if artist_id.is_empty() {
                report.skip("Artist", "", "artist without id");
                continue;
            }

            if !self
                .upsert(ctx, &NodeUpsert::artist(&artist_id, &artist, event.play), report)
                .await?
            {
                continue;
            }

            let artist_node = NodeRef::new(Label::Artist, &artist_id);
            self.connect(
                ctx,
                Edge::new(track_node.clone(), Relation::MadeBy, artist_node.clone()),
                report,
            )
            .await?;
            if let Some(album_node) = album_node {
                self.connect(
                    ctx,
                    Edge::new(album_node.clone(), Relation::MadeBy, artist_node.clone()),
                    report,
                )
                .await?;
            }
            self.apply_genres(ctx, &artist.genres, &artist_node, event.play, report)
                .await?;
        }
        Ok(())
    }

    async fn apply_playlist(
        &self,
        ctx: &TenantContext,
        event: &PlayEvent<'_>,
        track_node: &NodeRef,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let context = &event.track.context;
        let target = ResourceRef::url_or_id(&context.url, &context.id);
        let Some(payload) = self
            .fetch_facet(ctx, ResourceKind::Playlist, &target, &context.id, report)
            .await
        else {
            return Ok(());
        };

        if context.id.is_empty() {
            report.skip("Playlist", &context.url, "playlist context without id");
            return Ok(());
        }

        let playlist = mapper::map_playlist(&payload);
        if !self
            .upsert(ctx, &NodeUpsert::playlist(&context.id, &playlist, event.play), report)
            .await?
        {
            return Ok(());
        }

        self.connect(
            ctx,
            Edge::new(
                track_node.clone(),
                Relation::InPlaylist,
                NodeRef::new(Label::Playlist, &context.id),
            ),
            report,
        )
        .await
    }

    async fn apply_genres(
        &self,
        ctx: &TenantContext,
        genres: &[String],
        owner: &NodeRef,
        play: Play,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        for genre in genres.iter().filter(|g| !g.is_empty()) {
            if self
                .upsert(ctx, &NodeUpsert::genre(genre, play), report)
                .await?
            {
                self.connect(
                    ctx,
                    Edge::new(owner.clone(), Relation::Genre, NodeRef::new(Label::Genre, genre)),
                    report,
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Fetches one facet of an event. Failures are logged, recorded and
    /// swallowed so the rest of the event proceeds.
    async fn fetch_facet(
        &self,
        ctx: &TenantContext,
        kind: ResourceKind,
        target: &ResourceRef,
        id: &str,
        report: &mut SyncReport,
    ) -> Option<Value> {
        match self.api.fetch(&ctx.access_token, kind, target).await {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(tenant_id = %ctx.tenant_id, kind = kind.as_str(), id, error = %e, "skipping entity");
                report.skip(kind.as_str(), id, e);
                None
            }
        }
    }

    /// Applies a node upsert. Returns whether the node is now present.
    async fn upsert(
        &self,
        ctx: &TenantContext,
        upsert: &NodeUpsert,
        report: &mut SyncReport,
    ) -> Result<bool, SyncError> {
        match self.graph.upsert_node(&ctx.tenant_id, upsert).await {
            Ok(UpsertOutcome::Created) => {
                report.nodes_created += 1;
                Ok(true)
            }
            Ok(UpsertOutcome::Appended | UpsertOutcome::AlreadyRecorded) => {
                report.nodes_updated += 1;
                Ok(true)
            }
            Err(e) => {
                absorb(ctx, report, upsert.node.label.as_str(), &upsert.node.id, e)?;
                Ok(false)
            }
        }
    }

    async fn connect(
        &self,
        ctx: &TenantContext,
        edge: Edge,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        match self.graph.ensure_edge(&ctx.tenant_id, &edge).await {
            Ok(true) => {
                report.edges_created += 1;
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                let id = format!("{}-[{}]->{}", edge.from.id, edge.relation, edge.to.id);
                absorb(ctx, report, edge.relation.as_str(), &id, e)
            }
        }
    }

    /// Deletes every node of the tenant.
    pub async fn delete_tenant(&self, tenant_id: &str) -> Result<u64, SyncError> {
        let deleted = self.graph.delete_tenant(tenant_id).await?;
        if deleted == 0 {
            return Err(SyncError::TenantNotFound(tenant_id.to_string()));
        }
        info!(tenant_id, deleted, "tenant deleted");
        Ok(deleted)
    }

    pub async fn list_tenants(&self) -> Result<Vec<String>, SyncError> {
        Ok(self.graph.list_tenants().await?)
    }

    pub async fn count_nodes(&self, tenant_id: &str) -> Result<Vec<(Label, u64)>, SyncError> {
        Ok(self.graph.count_nodes(tenant_id).await?)
    }
}

/// Records a failed statement and continues, unless the backend is gone.
fn absorb(
    ctx: &TenantContext,
    report: &mut SyncReport,
    kind: &str,
    id: &str,
    error: BackendError,
) -> Result<(), SyncError> {
    if error.is_fatal() {
        return Err(error.into());
    }
    warn!(tenant_id = %ctx.tenant_id, kind, id, error = %error, "graph statement failed");
    report.skip(kind, id, error);
    Ok(())
}
