//! In-memory graph store.
//!
//! Mirrors the semantics of the Neo4j statements using
//! `tokio::sync::RwLock<HashMap<K, V>>` collections, so the engine can be
//! exercised without a running database. [`MemoryGraph::set_unavailable`]
//! simulates a backend that cannot be reached.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    error::BackendError,
    types::{Secret, TenantConfig},
};

use super::{Edge, GraphStore, Label, NodeRef, NodeUpsert, PropValue, TokenStore, UpsertOutcome};

type NodeKey = (String, NodeRef);
type EdgeKey = (String, Edge);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredNode {
    pub properties: BTreeMap<&'static str, PropValue>,
    pub play_history: Vec<i64>,
    pub hour_of_day: Vec<u32>,
}

impl StoredNode {
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.properties.get(key) {
            Some(PropValue::Str(value)) => Some(value),
            _ => None,
        }
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.properties.get(key) {
            Some(PropValue::Int(value)) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct ConfigEntry {
    config: TenantConfig,
    oauth_state: Option<(String, String)>,
}

#[derive(Default)]
pub struct MemoryGraph {
    configs: RwLock<HashMap<String, ConfigEntry>>,
    nodes: RwLock<HashMap<NodeKey, StoredNode>>,
    edges: RwLock<HashSet<EdgeKey>>,
    unavailable: AtomicBool,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with [`BackendError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable(
                "memory graph marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn node(&self, tenant_id: &str, label: Label, id: &str) -> Option<StoredNode> {
        self.nodes
            .read()
            .await
            .get(&(tenant_id.to_string(), NodeRef::new(label, id)))
            .cloned()
    }

    pub async fn nodes_of(&self, tenant_id: &str) -> Vec<(NodeRef, StoredNode)> {
        self.nodes
            .read()
            .await
            .iter()
            .filter(|((tenant, _), _)| tenant == tenant_id)
            .map(|((_, node), stored)| (node.clone(), stored.clone()))
            .collect()
    }

    pub async fn node_count(&self, tenant_id: &str) -> usize {
        self.nodes_of(tenant_id).await.len()
    }

    pub async fn edges_of(&self, tenant_id: &str) -> Vec<Edge> {
        self.edges
            .read()
            .await
            .iter()
            .filter(|(tenant, _)| tenant == tenant_id)
            .map(|(_, edge)| edge.clone())
            .collect()
    }

    pub async fn has_edge(&self, tenant_id: &str, edge: &Edge) -> bool {
        self.edges
            .read()
            .await
            .contains(&(tenant_id.to_string(), edge.clone()))
    }

    pub async fn config(&self, tenant_id: &str) -> Option<TenantConfig> {
        self.configs
            .read()
            .await
            .get(tenant_id)
            .map(|entry| entry.config.clone())
    }

    pub async fn pending_oauth_state(&self, tenant_id: &str) -> Option<(String, String)> {
        self.configs
            .read()
            .await
            .get(tenant_id)
            .and_then(|entry| entry.oauth_state.clone())
    }

    async fn update_config<F>(&self, tenant_id: &str, update: F) -> Result<(), BackendError>
    where
        F: FnOnce(&mut ConfigEntry) + Send,
    {
        self.check()?;
        if let Some(entry) = self.configs.write().await.get_mut(tenant_id) {
            update(entry);
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn upsert_node(
        &self,
        tenant_id: &str,
        upsert: &NodeUpsert,
    ) -> Result<UpsertOutcome, BackendError> {
        self.check()?;
        let mut nodes = self.nodes.write().await;
        let key = (tenant_id.to_string(), upsert.node.clone());

        let Some(stored) = nodes.get_mut(&key) else {
            let node = StoredNode {
                properties: upsert
                    .properties
                    .iter()
                    .map(|p| (p.key, p.value.clone()))
                    .collect(),
                play_history: vec![upsert.play.played_at],
                hour_of_day: vec![upsert.play.hour],
            };
            nodes.insert(key, node);
            return Ok(UpsertOutcome::Created);
        };

        for property in upsert.properties.iter().filter(|p| !p.create_only) {
            stored.properties.insert(property.key, property.value.clone());
        }

        if stored.play_history.contains(&upsert.play.played_at) {
            return Ok(UpsertOutcome::AlreadyRecorded);
        }

        stored.play_history.push(upsert.play.played_at);
        stored.hour_of_day.push(upsert.play.hour);
        Ok(UpsertOutcome::Appended)
    }

    async fn ensure_edge(&self, tenant_id: &str, edge: &Edge) -> Result<bool, BackendError> {
        self.check()?;
        {
            let nodes = self.nodes.read().await;
            let from = (tenant_id.to_string(), edge.from.clone());
            let to = (tenant_id.to_string(), edge.to.clone());
            if !nodes.contains_key(&from) || !nodes.contains_key(&to) {
                return Ok(false);
            }
        }

        Ok(self
            .edges
            .write()
            .await
            .insert((tenant_id.to_string(), edge.clone())))
    }

    async fn delete_tenant(&self, tenant_id: &str) -> Result<u64, BackendError> {
        self.check()?;
        let mut deleted = 0u64;

        let mut nodes = self.nodes.write().await;
        let before = nodes.len();
        nodes.retain(|(tenant, _), _| tenant != tenant_id);
        deleted += (before - nodes.len()) as u64;

        if self.configs.write().await.remove(tenant_id).is_some() {
            deleted += 1;
        }

        self.edges
            .write()
            .await
            .retain(|(tenant, _)| tenant != tenant_id);

        Ok(deleted)
    }

    async fn list_tenants(&self) -> Result<Vec<String>, BackendError> {
        self.check()?;
        let mut tenants: Vec<String> = self.configs.read().await.keys().cloned().collect();
        tenants.sort();
        Ok(tenants)
    }

    async fn count_nodes(&self, tenant_id: &str) -> Result<Vec<(Label, u64)>, BackendError> {
        self.check()?;
        let mut counts: BTreeMap<Label, u64> = BTreeMap::new();
        for (tenant, node) in self.nodes.read().await.keys() {
            if tenant == tenant_id {
                *counts.entry(node.label).or_default() += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }
}

#[async_trait]
impl TokenStore for MemoryGraph {
    async fn ensure_config(
        &self,
        tenant_id: &str,
        initial_watermark: i64,
    ) -> Result<bool, BackendError> {
        self.check()?;
        let mut configs = self.configs.write().await;
        if configs.contains_key(tenant_id) {
            return Ok(false);
        }

        configs.insert(
            tenant_id.to_string(),
            ConfigEntry {
                config: TenantConfig {
                    tenant_id: tenant_id.to_string(),
                    last_sync_watermark: initial_watermark,
                    refresh_token: Secret::default(),
                    refresh_token_expired: true,
                },
                oauth_state: None,
            },
        );
        Ok(true)
    }

    async fn load_config(&self, tenant_id: &str) -> Result<Option<TenantConfig>, BackendError> {
        self.check()?;
        Ok(self.config(tenant_id).await)
    }

    async fn store_refresh_token(
        &self,
        tenant_id: &str,
        refresh_token: &str,
    ) -> Result<(), BackendError> {
        let refresh_token = Secret::new(refresh_token);
        self.update_config(tenant_id, move |entry| {
            entry.config.refresh_token = refresh_token;
        })
        .await
    }

    async fn store_refresh_token_expired(
        &self,
        tenant_id: &str,
        expired: bool,
    ) -> Result<(), BackendError> {
        self.update_config(tenant_id, move |entry| {
            entry.config.refresh_token_expired = expired;
        })
        .await
    }

    async fn store_oauth_state(
        &self,
        tenant_id: &str,
        state: &str,
        code_verifier: &str,
    ) -> Result<(), BackendError> {
        let pending = (state.to_string(), code_verifier.to_string());
        self.update_config(tenant_id, move |entry| {
            entry.oauth_state = Some(pending);
        })
        .await
    }

    async fn take_oauth_state(
        &self,
        tenant_id: &str,
    ) -> Result<Option<(String, String)>, BackendError> {
        self.check()?;
        Ok(self
            .configs
            .write()
            .await
            .get_mut(tenant_id)
            .and_then(|entry| entry.oauth_state.take()))
    }

    async fn advance_watermark(
        &self,
        tenant_id: &str,
        watermark: i64,
    ) -> Result<i64, BackendError> {
        self.check()?;
        let mut configs = self.configs.write().await;
        let entry = configs.get_mut(tenant_id).ok_or_else(|| {
            BackendError::Statement(format!("no config record for tenant {tenant_id}"))
        })?;
        entry.config.last_sync_watermark = entry.config.last_sync_watermark.max(watermark);
        Ok(entry.config.last_sync_watermark)
    }
}
