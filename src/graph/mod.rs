//! Graph store contract.
//!
//! The engine talks to the graph only through [`GraphStore`] (entity nodes and
//! relationships) and [`TokenStore`] (the per-tenant `Config` record). Every
//! operation is scoped by a tenant id. Labels and relationship types come from
//! the closed [`Label`] and [`Relation`] enums; all values are bound as
//! statement parameters.
//!
//! Two implementations exist: [`neo4j::Neo4jStore`] for production and
//! [`memory::MemoryGraph`] for tests and local experiments.

use std::fmt;

use async_trait::async_trait;

use crate::{
    error::BackendError,
    types::{AlbumRecord, ArtistRecord, PlaylistRecord, TenantConfig, TrackRecord},
};

pub mod memory;
pub mod neo4j;

pub use memory::MemoryGraph;
pub use neo4j::Neo4jStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Track,
    Album,
    Artist,
    Genre,
    Playlist,
}

impl Label {
    pub const ALL: [Label; 5] = [
        Label::Track,
        Label::Album,
        Label::Artist,
        Label::Genre,
        Label::Playlist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Track => "Track",
            Label::Album => "Album",
            Label::Artist => "Artist",
            Label::Genre => "Genre",
            Label::Playlist => "Playlist",
        }
    }

    pub fn parse(label: &str) -> Option<Label> {
        Label::ALL.into_iter().find(|l| l.as_str() == label)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Relation {
    MadeBy,
    InAlbum,
    Genre,
    InPlaylist,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::MadeBy => "MADE_BY",
            Relation::InAlbum => "IN_ALBUM",
            Relation::Genre => "GENRE",
            Relation::InPlaylist => "IN_PLAYLIST",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub label: Label,
    pub id: String,
}

impl NodeRef {
    pub fn new(label: Label, id: impl Into<String>) -> Self {
        Self {
            label,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: NodeRef,
    pub relation: Relation,
    pub to: NodeRef,
}

impl Edge {
    pub fn new(from: NodeRef, relation: Relation, to: NodeRef) -> Self {
        Self { from, relation, to }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    Str(String),
    Int(i64),
}

/// A scalar node property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub key: &'static str,
    pub value: PropValue,
    /// Only written when the node is created; later sightings keep the old value.
    pub create_only: bool,
}

impl Property {
    fn text(key: &'static str, value: &str) -> Self {
        Self {
            key,
            value: PropValue::Str(value.to_string()),
            create_only: false,
        }
    }

    fn int(key: &'static str, value: i64) -> Self {
        Self {
            key,
            value: PropValue::Int(value),
            create_only: false,
        }
    }

    fn initial(mut self) -> Self {
        self.create_only = true;
        self
    }
}

/// One play event applied to a node's history arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Play {
    pub played_at: i64,
    pub hour: u32,
}

/// Create-or-append request for a single entity node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeUpsert {
    pub node: NodeRef,
    pub properties: Vec<Property>,
    pub play: Play,
}

impl NodeUpsert {
    pub fn track(record: &TrackRecord, play: Play) -> Self {
        Self {
            node: NodeRef::new(Label::Track, &record.id),
            properties: vec![
                Property::text("name", &record.name).initial(),
                Property::int("popularity", record.popularity),
                Property::text("preview_url", &record.preview_url),
            ],
            play,
        }
    }

    pub fn album(id: &str, record: &AlbumRecord, play: Play) -> Self {
        Self {
            node: NodeRef::new(Label::Album, id),
            properties: vec![
                Property::text("name", &record.name).initial(),
                Property::text("image_url", &record.image_url),
                Property::text("label", &record.label),
                Property::int("popularity", record.popularity),
            ],
            play,
        }
    }

    pub fn artist(id: &str, record: &ArtistRecord, play: Play) -> Self {
        Self {
            node: NodeRef::new(Label::Artist, id),
            properties: vec![
                Property::text("name", &record.name).initial(),
                Property::text("image_url", &record.image_url),
                Property::int("num_followers", record.num_followers),
                Property::int("popularity", record.popularity),
            ],
            play,
        }
    }

    pub fn genre(name: &str, play: Play) -> Self {
        Self {
            node: NodeRef::new(Label::Genre, name),
            properties: vec![Property::text("name", name).initial()],
            play,
        }
    }

    pub fn playlist(id: &str, record: &PlaylistRecord, play: Play) -> Self {
        Self {
            node: NodeRef::new(Label::Playlist, id),
            properties: vec![
                Property::text("name", &record.name).initial(),
                Property::text("owner_name", &record.owner_name).initial(),
                Property::text("description", &record.description),
                Property::int("num_followers", record.num_followers),
                Property::text("image_url", &record.image_url),
            ],
            play,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The node did not exist and was created with a one-entry history.
    Created,
    /// The node existed and the play was appended.
    Appended,
    /// The node existed and already recorded this timestamp.
    AlreadyRecorded,
}

/// Entity nodes and relationships, scoped per tenant.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Creates the node or overwrites its mutable fields, appending the play to
    /// `play_history`/`hour_of_day` unless the timestamp is already recorded.
    async fn upsert_node(
        &self,
        tenant_id: &str,
        upsert: &NodeUpsert,
    ) -> Result<UpsertOutcome, BackendError>;

    /// Creates the relationship unless one of that type already exists between
    /// the ordered pair. Returns whether a relationship was created. Missing
    /// endpoints create nothing.
    async fn ensure_edge(&self, tenant_id: &str, edge: &Edge) -> Result<bool, BackendError>;

    /// Detaches and deletes every node carrying the tenant id.
    async fn delete_tenant(&self, tenant_id: &str) -> Result<u64, BackendError>;

    /// Tenants that own a configuration record.
    async fn list_tenants(&self) -> Result<Vec<String>, BackendError>;

    /// Node counts per entity label for a tenant.
    async fn count_nodes(&self, tenant_id: &str) -> Result<Vec<(Label, u64)>, BackendError>;
}

/// Per-tenant OAuth state and sync watermark.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Creates the tenant's config record if missing. Returns whether it was created.
    async fn ensure_config(
        &self,
        tenant_id: &str,
        initial_watermark: i64,
    ) -> Result<bool, BackendError>;

    async fn load_config(&self, tenant_id: &str) -> Result<Option<TenantConfig>, BackendError>;

    async fn store_refresh_token(
        &self,
        tenant_id: &str,
        refresh_token: &str,
    ) -> Result<(), BackendError>;

    async fn store_refresh_token_expired(
        &self,
        tenant_id: &str,
        expired: bool,
    ) -> Result<(), BackendError>;

    async fn store_oauth_state(
        &self,
        tenant_id: &str,
        state: &str,
        code_verifier: &str,
    ) -> Result<(), BackendError>;

    /// Returns and clears the pending `(state, code_verifier)` pair.
    async fn take_oauth_state(
        &self,
        tenant_id: &str,
    ) -> Result<Option<(String, String)>, BackendError>;

    /// Raises the watermark to `watermark` if it is newer. Returns the stored value.
    async fn advance_watermark(&self, tenant_id: &str, watermark: i64)
    -> Result<i64, BackendError>;
}
