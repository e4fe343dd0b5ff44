use async_trait::async_trait;
use neo4rs::{ConfigBuilder, Graph, Query, Row, query};
use tracing::debug;

use crate::{
    error::BackendError,
    types::{Secret, TenantConfig},
};

use super::{Edge, GraphStore, Label, NodeUpsert, PropValue, TokenStore, UpsertOutcome};

/// Neo4j-backed store. Every statement is parameterized; only labels and
/// relationship types, which come from closed enums, are spliced into the text.
#[derive(Clone)]
pub struct Neo4jStore {
    graph: Graph,
}

fn classify(err: neo4rs::Error) -> BackendError {
    match &err {
        neo4rs::Error::ConnectionError | neo4rs::Error::IOError { .. } => {
            BackendError::Unavailable(err.to_string())
        }
        _ => BackendError::Statement(err.to_string()),
    }
}

fn bind(q: Query, key: &str, value: &PropValue) -> Query {
    match value {
        PropValue::Str(s) => q.param(key, s.clone()),
        PropValue::Int(i) => q.param(key, *i),
    }
}

fn upsert_statement(upsert: &NodeUpsert) -> String {
    let on_create: String = upsert
        .properties
        .iter()
        .filter(|p| p.create_only)
        .map(|p| format!(", n.{key} = $p_{key}", key = p.key))
        .collect();

    let overwrite: Vec<String> = upsert
        .properties
        .iter()
        .filter(|p| !p.create_only)
        .map(|p| format!("n.{key} = $p_{key}", key = p.key))
        .collect();

    let overwrite = if overwrite.is_empty() {
        String::new()
    } else {
        format!("SET {}\n", overwrite.join(", "))
    };

    format!(
        "MERGE (n:{label} {{tenant_id: $tenant_id, id: $id}})
         ON CREATE SET n.play_history = [], n.hour_of_day = []{on_create}
         WITH n,
              size(n.play_history) = 0 AS created,
              size([t IN n.play_history WHERE t = $played_at]) > 0 AS seen
         {overwrite}
         SET n.play_history = CASE WHEN seen THEN n.play_history ELSE n.play_history + $played_at END,
             n.hour_of_day = CASE WHEN seen THEN n.hour_of_day ELSE n.hour_of_day + $hour END
         RETURN created, seen",
        label = upsert.node.label.as_str(),
    )
}

fn edge_statement(edge: &Edge) -> String {
    format!(
        "MATCH (a:{from} {{tenant_id: $tenant_id, id: $from_id}})
         MATCH (b:{to} {{tenant_id: $tenant_id, id: $to_id}})
         WHERE NOT (a)-[:{rel}]->(b)
         CREATE (a)-[:{rel}]->(b)
         RETURN count(*) AS created",
        from = edge.from.label.as_str(),
        to = edge.to.label.as_str(),
        rel = edge.relation.as_str(),
    )
}

impl Neo4jStore {
    /// Connect to Neo4j with the given credentials.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, BackendError> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .fetch_size(500)
            .max_connections(10)
            .build()
            .map_err(classify)?;
        let graph = Graph::connect(config).await.map_err(classify)?;
        Ok(Self { graph })
    }

    async fn fetch_one(&self, q: Query) -> Result<Option<Row>, BackendError> {
        let mut stream = self.graph.execute(q).await.map_err(classify)?;
        stream.next().await.map_err(classify)
    }

    async fn fetch_all(&self, q: Query) -> Result<Vec<Row>, BackendError> {
        let mut stream = self.graph.execute(q).await.map_err(classify)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(classify)? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn run(&self, q: Query) -> Result<(), BackendError> {
        self.graph.run(q).await.map_err(classify)
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn upsert_node(
        &self,
        tenant_id: &str,
        upsert: &NodeUpsert,
    ) -> Result<UpsertOutcome, BackendError> {
        let mut q = query(&upsert_statement(upsert))
            .param("tenant_id", tenant_id)
            .param("id", upsert.node.id.as_str())
            .param("played_at", upsert.play.played_at)
            .param("hour", i64::from(upsert.play.hour));
        for property in &upsert.properties {
            q = bind(q, &format!("p_{}", property.key), &property.value);
        }

        let row = self.fetch_one(q).await?.ok_or_else(|| {
            BackendError::Statement(format!("upsert of {} returned no row", upsert.node.id))
        })?;
        let created: bool = row.get("created").unwrap_or(false);
        let seen: bool = row.get("seen").unwrap_or(false);

        debug!(label = %upsert.node.label, id = %upsert.node.id, created, seen, "node upserted");
        Ok(match (created, seen) {
            (true, _) => UpsertOutcome::Created,
            (false, true) => UpsertOutcome::AlreadyRecorded,
            (false, false) => UpsertOutcome::Appended,
        })
    }

    async fn ensure_edge(&self, tenant_id: &str, edge: &Edge) -> Result<bool, BackendError> {
        let q = query(&edge_statement(edge))
            .param("tenant_id", tenant_id)
            .param("from_id", edge.from.id.as_str())
            .param("to_id", edge.to.id.as_str());

        let created: i64 = match self.fetch_one(q).await? {
            Some(row) => row.get("created").unwrap_or(0),
            None => 0,
        };
        Ok(created > 0)
    }

    async fn delete_tenant(&self, tenant_id: &str) -> Result<u64, BackendError> {
        let q = query(
            "MATCH (n {tenant_id: $tenant_id})
             WITH collect(n) AS doomed
             FOREACH (x IN doomed | DETACH DELETE x)
             RETURN size(doomed) AS deleted",
        )
        .param("tenant_id", tenant_id);

        let deleted: i64 = match self.fetch_one(q).await? {
            Some(row) => row.get("deleted").unwrap_or(0),
            None => 0,
        };
        Ok(deleted.max(0) as u64)
    }

    async fn list_tenants(&self) -> Result<Vec<String>, BackendError> {
        let q = query(
            "MATCH (c:Config)
             RETURN c.tenant_id AS tenant_id
             ORDER BY tenant_id",
        );
        let rows = self.fetch_all(q).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get::<String>("tenant_id").ok())
            .collect())
    }

    async fn count_nodes(&self, tenant_id: &str) -> Result<Vec<(Label, u64)>, BackendError> {
        let q = query(
            "MATCH (n {tenant_id: $tenant_id})
             WHERE NOT n:Config
             RETURN head(labels(n)) AS label, count(n) AS total
             ORDER BY label",
        )
        .param("tenant_id", tenant_id);

        let rows = self.fetch_all(q).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let label: String = row.get("label").ok()?;
                let total: i64 = row.get("total").ok()?;
                Some((Label::parse(&label)?, total.max(0) as u64))
            })
            .collect())
    }
}

#[async_trait]
impl TokenStore for Neo4jStore {
    async fn ensure_config(
        &self,
        tenant_id: &str,
        initial_watermark: i64,
    ) -> Result<bool, BackendError> {
        let q = query(
            "OPTIONAL MATCH (existing:Config {tenant_id: $tenant_id})
             WITH existing WHERE existing IS NULL
             CREATE (c:Config {
                 tenant_id: $tenant_id,
                 name: 'configuration',
                 last_sync_watermark: $watermark,
                 refresh_token: '',
                 refresh_token_expired: true
             })
             RETURN count(c) AS created",
        )
        .param("tenant_id", tenant_id)
        .param("watermark", initial_watermark);

        let created: i64 = match self.fetch_one(q).await? {
            Some(row) => row.get("created").unwrap_or(0),
            None => 0,
        };
        Ok(created > 0)
    }

    async fn load_config(&self, tenant_id: &str) -> Result<Option<TenantConfig>, BackendError> {
        let q = query(
            "MATCH (c:Config {tenant_id: $tenant_id})
             RETURN c.last_sync_watermark AS watermark,
                    coalesce(c.refresh_token, '') AS refresh_token,
                    coalesce(c.refresh_token_expired, true) AS expired",
        )
        .param("tenant_id", tenant_id);

        Ok(self.fetch_one(q).await?.map(|row| TenantConfig {
            tenant_id: tenant_id.to_string(),
            last_sync_watermark: row.get("watermark").unwrap_or(0),
            refresh_token: Secret::new(row.get::<String>("refresh_token").unwrap_or_default()),
            refresh_token_expired: row.get("expired").unwrap_or(true),
        }))
    }

    async fn store_refresh_token(
        &self,
        tenant_id: &str,
        refresh_token: &str,
    ) -> Result<(), BackendError> {
        self.run(
            query(
                "MATCH (c:Config {tenant_id: $tenant_id})
                 SET c.refresh_token = $refresh_token",
            )
            .param("tenant_id", tenant_id)
            .param("refresh_token", refresh_token),
        )
        .await
    }

    async fn store_refresh_token_expired(
        &self,
        tenant_id: &str,
        expired: bool,
    ) -> Result<(), BackendError> {
        self.run(
            query(
                "MATCH (c:Config {tenant_id: $tenant_id})
                 SET c.refresh_token_expired = $expired",
            )
            .param("tenant_id", tenant_id)
            .param("expired", expired),
        )
        .await
    }

    async fn store_oauth_state(
        &self,
        tenant_id: &str,
        state: &str,
        code_verifier: &str,
    ) -> Result<(), BackendError> {
        self.run(
            query(
                "MATCH (c:Config {tenant_id: $tenant_id})
                 SET c.oauth_state = $state, c.pkce_verifier = $code_verifier",
            )
            .param("tenant_id", tenant_id)
            .param("state", state)
            .param("code_verifier", code_verifier),
        )
        .await
    }

    async fn take_oauth_state(
        &self,
        tenant_id: &str,
    ) -> Result<Option<(String, String)>, BackendError> {
        let q = query(
            "MATCH (c:Config {tenant_id: $tenant_id})
             WITH c, coalesce(c.oauth_state, '') AS state, coalesce(c.pkce_verifier, '') AS verifier
             REMOVE c.oauth_state, c.pkce_verifier
             RETURN state, verifier",
        )
        .param("tenant_id", tenant_id);

        let Some(row) = self.fetch_one(q).await? else {
            return Ok(None);
        };
        let state: String = row.get("state").unwrap_or_default();
        let verifier: String = row.get("verifier").unwrap_or_default();
        if state.is_empty() || verifier.is_empty() {
            return Ok(None);
        }
        Ok(Some((state, verifier)))
    }

    async fn advance_watermark(
        &self,
        tenant_id: &str,
        watermark: i64,
    ) -> Result<i64, BackendError> {
        let q = query(
            "MATCH (c:Config {tenant_id: $tenant_id})
             SET c.last_sync_watermark =
                 CASE WHEN $watermark > c.last_sync_watermark
                      THEN $watermark ELSE c.last_sync_watermark END
             RETURN c.last_sync_watermark AS watermark",
        )
        .param("tenant_id", tenant_id)
        .param("watermark", watermark);

        let row = self.fetch_one(q).await?.ok_or_else(|| {
            BackendError::Statement(format!("no config record for tenant {tenant_id}"))
        })?;
        Ok(row.get("watermark").unwrap_or(watermark))
    }
}
