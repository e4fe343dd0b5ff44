mod common;

use std::{collections::HashSet, sync::Arc};

use common::*;
use spotgraph::{
    error::{AuthError, SyncError},
    graph::{Edge, GraphStore, Label, NodeRef, Relation, TokenStore},
    spotify::{ResourceKind, ResourceRef},
    sync::{SyncOutcome, SyncReport, pool},
};

const TENANT: &str = "alice";

fn id(value: &str) -> ResourceRef {
    ResourceRef::Id(value.to_string())
}

fn edge(from: (Label, &str), relation: Relation, to: (Label, &str)) -> Edge {
    Edge::new(NodeRef::new(from.0, from.1), relation, NodeRef::new(to.0, to.1))
}

fn done(outcome: SyncOutcome) -> SyncReport {
    match outcome {
        SyncOutcome::Done(report) => report,
        other => panic!("expected a completed pass, got {other:?}"),
    }
}

/// One playlist-context play of `t1` on album `al1` by artist `ar1`.
async fn single_play_harness() -> Harness {
    let h = Harness::new();
    h.authorized_tenant(TENANT).await;
    h.api
        .feed(vec![play_event("t1", T0 + 100, "al1", &["ar1"], Some("pl1"))]);
    h.api
        .respond(ResourceKind::Album, id("al1"), album_payload("Album One", &[]));
    h.api
        .respond(ResourceKind::Artist, id("ar1"), artist_payload("ar1", &[]));
    h.api.respond(
        ResourceKind::Playlist,
        playlist_url("pl1"),
        playlist_payload("Daily Mix"),
    );
    h
}

#[tokio::test]
async fn test_first_pass_materializes_event() {
    let h = single_play_harness().await;

    let report = done(
        h.orchestrator
            .sync_tenant_at(TENANT, STARTED_AT, None)
            .await
            .unwrap(),
    );

    assert_eq!(report.events_fetched, 1);
    assert_eq!(report.events_applied, 1);
    assert_eq!(report.nodes_created, 4);
    assert_eq!(report.edges_created, 4);
    assert!(report.skipped.is_empty());

    let track = h.graph.node(TENANT, Label::Track, "t1").await.unwrap();
    assert_eq!(track.play_history, vec![T0 + 100]);
    assert_eq!(track.text("name"), Some("Track t1"));
    assert!(h.graph.node(TENANT, Label::Album, "al1").await.is_some());
    assert!(h.graph.node(TENANT, Label::Artist, "ar1").await.is_some());
    let playlist = h.graph.node(TENANT, Label::Playlist, "pl1").await.unwrap();
    assert_eq!(playlist.text("owner_name"), Some("Spotify"));
    assert_eq!(h.graph.node_count(TENANT).await, 4);

    let expected: HashSet<Edge> = [
        edge((Label::Track, "t1"), Relation::InAlbum, (Label::Album, "al1")),
        edge((Label::Track, "t1"), Relation::MadeBy, (Label::Artist, "ar1")),
        edge((Label::Album, "al1"), Relation::MadeBy, (Label::Artist, "ar1")),
        edge((Label::Track, "t1"), Relation::InPlaylist, (Label::Playlist, "pl1")),
    ]
    .into_iter()
    .collect();
    let edges = h.graph.edges_of(TENANT).await;
    assert_eq!(edges.len(), 4);
    assert_eq!(edges.into_iter().collect::<HashSet<_>>(), expected);

    // Watermark is the pass start, not the event time.
    let config = h.graph.config(TENANT).await.unwrap();
    assert_eq!(config.last_sync_watermark, STARTED_AT);
    assert_eq!(report.watermark, STARTED_AT);
    assert!(!config.refresh_token_expired);

    // Every resource call carried the refreshed access token.
    assert!(h.api.tokens_seen().iter().all(|t| t == ACCESS_TOKEN));
}

#[tokio::test]
async fn test_rerun_with_same_feed_changes_nothing() {
    let h = single_play_harness().await;
    h.orchestrator
        .sync_tenant_at(TENANT, STARTED_AT, None)
        .await
        .unwrap();
    let nodes_before = h.graph.nodes_of(TENANT).await;
    let edges_before = h.graph.edges_of(TENANT).await.len();

    let report = done(
        h.orchestrator
            .sync_tenant_at(TENANT, STARTED_AT + 60, None)
            .await
            .unwrap(),
    );

    assert_eq!(report.events_applied, 0);
    assert_eq!(report.events_below_watermark, 1);
    assert_eq!(report.nodes_created, 0);
    assert_eq!(report.edges_created, 0);
    assert_eq!(h.graph.edges_of(TENANT).await.len(), edges_before);

    let track = h.graph.node(TENANT, Label::Track, "t1").await.unwrap();
    assert_eq!(track.play_history.len(), 1);
    assert_eq!(h.graph.nodes_of(TENANT).await.len(), nodes_before.len());
}

#[tokio::test]
async fn test_album_fetch_failure_skips_only_album() {
    let h = single_play_harness().await;
    h.api.fail(ResourceKind::Album, id("al1"), 500);

    let report = done(
        h.orchestrator
            .sync_tenant_at(TENANT, STARTED_AT, None)
            .await
            .unwrap(),
    );

    assert!(h.graph.node(TENANT, Label::Track, "t1").await.is_some());
    assert!(h.graph.node(TENANT, Label::Album, "al1").await.is_none());
    assert!(
        h.graph
            .edges_of(TENANT)
            .await
            .iter()
            .all(|e| e.relation != Relation::InAlbum && e.from.label != Label::Album)
    );

    // Artist and playlist facets still proceed.
    assert!(h.graph.node(TENANT, Label::Artist, "ar1").await.is_some());
    assert!(
        h.graph
            .has_edge(
                TENANT,
                &edge((Label::Track, "t1"), Relation::MadeBy, (Label::Artist, "ar1"))
            )
            .await
    );
    assert!(h.graph.node(TENANT, Label::Playlist, "pl1").await.is_some());

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].kind, "album");
    assert_eq!(report.skipped[0].id, "al1");
    assert_eq!(h.graph.config(TENANT).await.unwrap().last_sync_watermark, STARTED_AT);
}

#[tokio::test]
async fn test_rejected_refresh_aborts_before_fetch() {
    let h = single_play_harness().await;
    h.endpoint.reject(AuthError::Rejected {
        status: 400,
        body: "invalid_grant".to_string(),
    });

    let outcome = h
        .orchestrator
        .sync_tenant_at(TENANT, STARTED_AT, None)
        .await
        .unwrap();

    assert!(matches!(outcome, SyncOutcome::Expired));
    assert!(h.api.calls().is_empty());
    assert_eq!(h.graph.node_count(TENANT).await, 0);

    let config = h.graph.config(TENANT).await.unwrap();
    assert!(config.refresh_token_expired);
    assert_eq!(config.last_sync_watermark, T0);
}

#[tokio::test]
async fn test_unknown_tenant_gets_config_and_expires() {
    let h = Harness::new();

    let outcome = h
        .orchestrator
        .sync_tenant_at("newcomer", STARTED_AT, None)
        .await
        .unwrap();

    assert!(matches!(outcome, SyncOutcome::Expired));
    assert_eq!(h.endpoint.calls(), 0);
    let config = h.graph.config("newcomer").await.unwrap();
    assert_eq!(config.last_sync_watermark, T0);
    assert!(config.refresh_token_expired);
}

#[tokio::test]
async fn test_feed_failure_aborts_pass() {
    let h = Harness::new();
    h.authorized_tenant(TENANT).await;
    h.api
        .fail(ResourceKind::RecentlyPlayed, ResourceRef::Current, 503);

    let outcome = h
        .orchestrator
        .sync_tenant_at(TENANT, STARTED_AT, None)
        .await
        .unwrap();

    assert!(matches!(outcome, SyncOutcome::FeedUnavailable(_)));
    assert_eq!(h.graph.config(TENANT).await.unwrap().last_sync_watermark, T0);
}

#[tokio::test]
async fn test_empty_feed_leaves_watermark() {
    let h = Harness::new();
    h.authorized_tenant(TENANT).await;
    h.api.feed(vec![]);
    let sink = RecordingSink::default();

    let report = done(
        h.orchestrator
            .sync_tenant_at(TENANT, STARTED_AT, Some(&sink))
            .await
            .unwrap(),
    );

    assert_eq!(report.events_fetched, 0);
    assert_eq!(report.watermark, T0);
    assert_eq!(h.graph.config(TENANT).await.unwrap().last_sync_watermark, T0);
    assert_eq!(h.graph.node_count(TENANT).await, 0);
    assert_eq!(*sink.0.lock().unwrap(), vec![100]);
}

#[tokio::test]
async fn test_events_at_or_below_watermark_are_skipped() {
    let h = Harness::new();
    h.authorized_tenant(TENANT).await;
    h.api.feed(vec![
        play_event("new", T0 + 1, "al1", &[], None),
        play_event("edge", T0, "al1", &[], None),
        play_event("old", T0 - 500, "al1", &[], None),
    ]);
    h.api
        .respond(ResourceKind::Album, id("al1"), album_payload("Album One", &[]));

    let report = done(
        h.orchestrator
            .sync_tenant_at(TENANT, STARTED_AT, None)
            .await
            .unwrap(),
    );

    assert_eq!(report.events_applied, 1);
    assert_eq!(report.events_below_watermark, 2);
    assert!(h.graph.node(TENANT, Label::Track, "new").await.is_some());
    assert!(h.graph.node(TENANT, Label::Track, "edge").await.is_none());
    assert!(h.graph.node(TENANT, Label::Track, "old").await.is_none());
}

#[tokio::test]
async fn test_repeated_track_appends_history_in_order() {
    let h = Harness::new();
    h.authorized_tenant(TENANT).await;
    // Feed is newest first.
    h.api.feed(vec![
        play_event("t1", T0 + 7200, "al1", &["ar1"], None),
        play_event("t1", T0 + 3600, "al1", &["ar1"], None),
    ]);
    h.api.respond(
        ResourceKind::Album,
        id("al1"),
        album_payload("Album One", &["rock"]),
    );
    h.api
        .respond(ResourceKind::Artist, id("ar1"), artist_payload("ar1", &["rock", "indie"]));

    let report = done(
        h.orchestrator
            .sync_tenant_at(TENANT, STARTED_AT, None)
            .await
            .unwrap(),
    );
    assert_eq!(report.events_applied, 2);

    let track = h.graph.node(TENANT, Label::Track, "t1").await.unwrap();
    assert_eq!(track.play_history, vec![T0 + 3600, T0 + 7200]);
    assert_eq!(track.hour_of_day.len(), 2);
    assert_eq!(h.api.calls_of(ResourceKind::Album), 2);

    // Genre shared by album and artist records the play once per event.
    let rock = h.graph.node(TENANT, Label::Genre, "rock").await.unwrap();
    assert_eq!(rock.play_history, vec![T0 + 3600, T0 + 7200]);
    assert!(h.graph.node(TENANT, Label::Genre, "indie").await.is_some());
    assert!(
        h.graph
            .has_edge(TENANT, &edge((Label::Album, "al1"), Relation::Genre, (Label::Genre, "rock")))
            .await
    );
    assert!(
        h.graph
            .has_edge(TENANT, &edge((Label::Artist, "ar1"), Relation::Genre, (Label::Genre, "rock")))
            .await
    );
}

#[tokio::test]
async fn test_graph_invariants_hold_after_passes() {
    let h = Harness::new();
    h.authorized_tenant(TENANT).await;
    h.api.feed(vec![
        play_event("t2", T0 + 300, "al1", &["ar1", "ar2"], Some("pl1")),
        play_event("t1", T0 + 200, "al1", &["ar1"], Some("pl1")),
        play_event("t1", T0 + 100, "al1", &["ar1"], None),
    ]);
    h.api
        .respond(ResourceKind::Album, id("al1"), album_payload("Album One", &["pop"]));
    h.api
        .respond(ResourceKind::Artist, id("ar1"), artist_payload("ar1", &["pop"]));
    h.api
        .respond(ResourceKind::Artist, id("ar2"), artist_payload("ar2", &["jazz"]));
    h.api.respond(
        ResourceKind::Playlist,
        playlist_url("pl1"),
        playlist_payload("Daily Mix"),
    );

    let mut watermarks = vec![h.graph.config(TENANT).await.unwrap().last_sync_watermark];
    for (offset, started_at) in [STARTED_AT, STARTED_AT + 10, STARTED_AT - 1000].into_iter().enumerate() {
        h.orchestrator
            .sync_tenant_at(TENANT, started_at, None)
            .await
            .unwrap();
        watermarks.push(h.graph.config(TENANT).await.unwrap().last_sync_watermark);
        assert!(watermarks[offset + 1] >= watermarks[offset]);
    }

    for (_, node) in h.graph.nodes_of(TENANT).await {
        assert_eq!(node.play_history.len(), node.hour_of_day.len());
        let unique: HashSet<_> = node.play_history.iter().collect();
        assert_eq!(unique.len(), node.play_history.len());
    }

    let edges = h.graph.edges_of(TENANT).await;
    let unique: HashSet<_> = edges.iter().collect();
    assert_eq!(unique.len(), edges.len());
}

#[tokio::test]
async fn test_progress_reports_once_per_event() {
    let h = Harness::new();
    h.authorized_tenant(TENANT).await;
    h.api.feed(vec![
        play_event("t3", T0 + 300, "al1", &[], None),
        play_event("t2", T0 + 200, "al1", &[], None),
        play_event("t1", T0 + 100, "al1", &[], None),
        play_event("t0", T0 - 100, "al1", &[], None),
    ]);
    let sink = RecordingSink::default();

    h.orchestrator
        .sync_tenant_at(TENANT, STARTED_AT, Some(&sink))
        .await
        .unwrap();

    assert_eq!(*sink.0.lock().unwrap(), vec![25, 50, 75, 100]);
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let h = Harness::new();
    h.authorized_tenant("alice").await;
    h.authorized_tenant("bob").await;
    h.api
        .feed(vec![play_event("t1", T0 + 100, "al1", &["ar1"], None)]);
    h.api
        .respond(ResourceKind::Album, id("al1"), album_payload("Album One", &[]));
    h.api
        .respond(ResourceKind::Artist, id("ar1"), artist_payload("ar1", &[]));

    h.orchestrator
        .sync_tenant_at("alice", STARTED_AT, None)
        .await
        .unwrap();
    assert_eq!(h.graph.node_count("bob").await, 0);

    h.orchestrator
        .sync_tenant_at("bob", STARTED_AT + 5, None)
        .await
        .unwrap();

    // Same external ids, separate nodes and histories.
    let alice = h.graph.node("alice", Label::Track, "t1").await.unwrap();
    let bob = h.graph.node("bob", Label::Track, "t1").await.unwrap();
    assert_eq!(alice.play_history.len(), 1);
    assert_eq!(bob.play_history.len(), 1);
    assert_eq!(h.graph.config("alice").await.unwrap().last_sync_watermark, STARTED_AT);
    assert_eq!(h.graph.config("bob").await.unwrap().last_sync_watermark, STARTED_AT + 5);

    let counts = h.orchestrator.count_nodes("alice").await.unwrap();
    assert_eq!(
        counts,
        vec![(Label::Track, 1), (Label::Album, 1), (Label::Artist, 1)]
    );

    // An edge between bob's endpoints is not visible to alice.
    let e = edge((Label::Track, "t1"), Relation::InAlbum, (Label::Album, "al1"));
    assert!(h.graph.has_edge("alice", &e).await);
    assert!(h.graph.has_edge("bob", &e).await);
    assert!(!h.graph.has_edge("carol", &e).await);
}

#[tokio::test]
async fn test_delete_tenant() {
    let h = single_play_harness().await;
    h.authorized_tenant("bob").await;
    h.orchestrator
        .sync_tenant_at(TENANT, STARTED_AT, None)
        .await
        .unwrap();

    let deleted = h.orchestrator.delete_tenant(TENANT).await.unwrap();

    // Four entity nodes plus the configuration record.
    assert_eq!(deleted, 5);
    assert_eq!(h.graph.node_count(TENANT).await, 0);
    assert!(h.graph.edges_of(TENANT).await.is_empty());
    assert!(h.graph.config(TENANT).await.is_none());
    assert!(h.graph.config("bob").await.is_some());

    let again = h.orchestrator.delete_tenant(TENANT).await;
    assert!(matches!(again, Err(SyncError::TenantNotFound(t)) if t == TENANT));
}

#[tokio::test]
async fn test_unreachable_backend_aborts_pass() {
    let h = single_play_harness().await;
    h.graph.set_unavailable(true);

    let result = h
        .orchestrator
        .sync_tenant_at(TENANT, STARTED_AT, None)
        .await;

    assert!(matches!(result, Err(SyncError::Backend(e)) if e.is_fatal()));
}

#[tokio::test]
async fn test_pool_isolates_tenant_failures() {
    let h = Harness::new();
    h.authorized_tenant("alice").await;
    h.authorized_tenant("bob").await;
    // carol never authorized: expired.
    h.graph.ensure_config("carol", T0).await.unwrap();
    h.api
        .feed(vec![play_event("t1", T0 + 100, "al1", &[], None)]);
    h.api
        .respond(ResourceKind::Album, id("al1"), album_payload("Album One", &[]));

    let tenants = h.orchestrator.list_tenants().await.unwrap();
    assert_eq!(tenants, vec!["alice", "bob", "carol"]);

    let runs = pool::sync_tenants(&h.orchestrator, &tenants, 2, |_| None).await;

    assert_eq!(runs.len(), 3);
    assert_eq!(runs[0].tenant_id, "alice");
    assert!(matches!(runs[0].result, Ok(SyncOutcome::Done(_))));
    assert!(matches!(runs[1].result, Ok(SyncOutcome::Done(_))));
    assert!(matches!(runs[2].result, Ok(SyncOutcome::Expired)));
    assert!(h.graph.node("alice", Label::Track, "t1").await.is_some());
    assert!(h.graph.node("bob", Label::Track, "t1").await.is_some());
    assert_eq!(h.graph.node_count("carol").await, 0);
}

#[tokio::test]
async fn test_pool_reports_progress_per_tenant() {
    let h = Harness::new();
    h.authorized_tenant("alice").await;
    h.api
        .feed(vec![play_event("t1", T0 + 100, "al1", &[], None)]);
    let sink = Arc::new(RecordingSink::default());
    let shared = sink.clone();

    let runs = pool::sync_tenants(&h.orchestrator, &["alice".to_string()], 0, move |_| {
        Some(shared.clone() as Arc<dyn spotgraph::sync::ProgressSink>)
    })
    .await;

    assert!(runs[0].result.is_ok());
    assert_eq!(*sink.0.lock().unwrap(), vec![100]);
}

#[tokio::test]
async fn test_failed_statement_is_recorded_not_fatal() {
    use async_trait::async_trait;
    use spotgraph::{
        error::BackendError,
        graph::{MemoryGraph, NodeUpsert, UpsertOutcome},
        management::TokenManager,
        sync::SyncOrchestrator,
    };

    /// Fails every Artist upsert with a statement error.
    struct FlakyArtists(Arc<MemoryGraph>);

    #[async_trait]
    impl GraphStore for FlakyArtists {
        async fn upsert_node(&self, tenant_id: &str, upsert: &NodeUpsert) -> Result<UpsertOutcome, BackendError> {
            if upsert.node.label == Label::Artist {
                return Err(BackendError::Statement("constraint violated".to_string()));
            }
            self.0.upsert_node(tenant_id, upsert).await
        }
        async fn ensure_edge(&self, tenant_id: &str, edge: &Edge) -> Result<bool, BackendError> {
            self.0.ensure_edge(tenant_id, edge).await
        }
        async fn delete_tenant(&self, tenant_id: &str) -> Result<u64, BackendError> {
            self.0.delete_tenant(tenant_id).await
        }
        async fn list_tenants(&self) -> Result<Vec<String>, BackendError> {
            self.0.list_tenants().await
        }
        async fn count_nodes(&self, tenant_id: &str) -> Result<Vec<(Label, u64)>, BackendError> {
            self.0.count_nodes(tenant_id).await
        }
    }

    let h = single_play_harness().await;
    let tokens = TokenManager::new(h.endpoint.clone(), h.graph.clone(), oauth_settings());
    let orchestrator = SyncOrchestrator::new(
        h.api.clone(),
        Arc::new(FlakyArtists(h.graph.clone())),
        h.graph.clone(),
        tokens,
    );

    let report = done(
        orchestrator
            .sync_tenant_at(TENANT, STARTED_AT, None)
            .await
            .unwrap(),
    );

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].kind, "Artist");
    assert!(h.graph.node(TENANT, Label::Artist, "ar1").await.is_none());
    assert!(h.graph.node(TENANT, Label::Playlist, "pl1").await.is_some());
    assert_eq!(h.graph.config(TENANT).await.unwrap().last_sync_watermark, STARTED_AT);
}
