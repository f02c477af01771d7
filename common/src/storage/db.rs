use std::collections::{HashSet, VecDeque};
use std::ops::Deref;

use futures::future::BoxFuture;
use futures::Stream;
use serde_json::{json, Map, Value};
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Notification, Surreal,
};
use tracing::{instrument, warn};

use crate::error::GraphRagError;
use crate::storage::namespace_lock::NamespaceLocks;
use crate::storage::types::edge::Edge;
use crate::storage::types::node::Node;
use crate::storage::types::StoredObject;
use crate::utils::config::AppConfig;

/// Thin wrapper around one SurrealDB connection. The same struct serves
/// the embedded store (`mem://` or file address) and a remote graph
/// database: `engine::any::connect` dispatches on the address scheme, so
/// there is exactly one code path for both.
#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

impl SurrealDbClient {
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, surrealdb::Error> {
        let db = connect(address).await?;
        // `mem://` has no auth surface; remote backends require signin.
        if !address.starts_with("mem://") {
            db.signin(Root { username, password }).await?;
        }
        db.use_ns(namespace).use_db(database).await?;
        Ok(SurrealDbClient { client: db })
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, surrealdb::Error> {
        let db = connect("mem://").await?;
        db.use_ns(namespace).use_db(database).await?;
        Ok(SurrealDbClient { client: db })
    }

    pub async fn build_indexes(&self, embedding_dimension: usize) -> Result<(), surrealdb::Error> {
        self.client
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS idx_node_embedding ON node FIELDS embedding HNSW DIMENSION {embedding_dimension}"
            ))
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_node_namespace ON node FIELDS namespace")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_node_namespace_name ON node FIELDS namespace, name")
            .await?;
        self.client
            .query("DEFINE ANALYZER IF NOT EXISTS graphrag_text TOKENIZERS blank,class FILTERS lowercase")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_node_name_search ON node FIELDS name SEARCH ANALYZER graphrag_text BM25")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_edge_source ON edge FIELDS source_id")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_edge_target ON edge FIELDS target_id")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_job_status ON job FIELDS status")
            .await?;
        Ok(())
    }

    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, surrealdb::Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, surrealdb::Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }

    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, surrealdb::Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, surrealdb::Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }

    pub async fn listen<T>(
        &self,
    ) -> Result<impl Stream<Item = Result<Notification<T>, surrealdb::Error>>, surrealdb::Error>
    where
        T: for<'de> StoredObject + std::marker::Unpin,
    {
        self.client.select(T::table_name()).live().await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

/// Which physical backend actually served a request (§4.1 backend parity
/// rule, §7 `backend_unavailable`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTag {
    Primary,
    SqliteFallback,
}

impl StoreTag {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreTag::Primary => "primary",
            StoreTag::SqliteFallback => "sqlite_fallback",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UpsertOutcome {
    pub created: bool,
    pub merged: bool,
    pub store: StoreTag,
}

pub struct Neighbors {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub store: StoreTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleMode {
    Random,
    Viewport,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Viewport {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// The C1 storage adapter: one contract, dispatched transparently over
/// an always-available embedded backend and an optional remote graph
/// backend. Callers never branch on which one answered; they only see
/// the `store` tag on the result (§9 "dynamic dispatch across backends").
pub struct GraphStore {
    primary: SurrealDbClient,
    fallback: Option<SurrealDbClient>,
    locks: NamespaceLocks,
    bulk_chunk: usize,
}

impl GraphStore {
    pub async fn connect(config: &AppConfig) -> Result<Self, GraphRagError> {
        let embedded = SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?;

        let (primary, fallback) = match &config.graph_backend_address {
            Some(address) => {
                let remote = SurrealDbClient::new(
                    address,
                    &config.surrealdb_username,
                    &config.surrealdb_password,
                    &config.surrealdb_namespace,
                    &config.surrealdb_database,
                )
                .await;
                match remote {
                    Ok(remote) => (remote, Some(embedded)),
                    Err(err) => {
                        warn!(error = %err, "graph backend unreachable at startup, using embedded store only");
                        (embedded, None)
                    }
                }
            }
            None => (embedded, None),
        };

        Ok(Self {
            primary,
            fallback,
            locks: NamespaceLocks::new(),
            bulk_chunk: config.bulk_upsert_chunk,
        })
    }

    pub async fn ensure_initialized(&self, embedding_dimension: usize) -> Result<(), GraphRagError> {
        self.primary.build_indexes(embedding_dimension).await?;
        if let Some(fallback) = &self.fallback {
            fallback.build_indexes(embedding_dimension).await?;
        }
        Ok(())
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn from_embedded(client: SurrealDbClient) -> Self {
        Self {
            primary: client,
            fallback: None,
            locks: NamespaceLocks::new(),
            bulk_chunk: 500,
        }
    }

    async fn with_fallback<T>(
        &self,
        op: impl Fn(SurrealDbClient) -> BoxFuture<'static, Result<T, GraphRagError>>,
    ) -> Result<(T, StoreTag), GraphRagError> {
        match op(self.primary.clone()).await {
            Ok(value) => Ok((value, StoreTag::Primary)),
            Err(primary_err) => match &self.fallback {
                Some(fallback) => {
                    warn!(error = %primary_err, "graph backend unavailable, falling back to embedded store");
                    let value = op(fallback.clone()).await?;
                    Ok((value, StoreTag::SqliteFallback))
                }
                None => Err(primary_err),
            },
        }
    }

    /// Matches by identity `(namespace, label, normalized_name)`; on merge,
    /// unions `properties`, and preserves the embedding unless the new one
    /// is non-empty and the prior one was empty (§4.1).
    #[instrument(skip(self, node))]
    pub async fn upsert_node(&self, node: Node) -> Result<UpsertOutcome, GraphRagError> {
        let _guard = self.locks.acquire(&node.namespace).await;
        let id = node.id.clone();
        let (created, store) = self
            .with_fallback(move |db| {
                let node = node.clone();
                let id = id.clone();
                Box::pin(async move {
                    let existing: Option<Node> = db.client.select(("node", id.as_str())).await?;
                    match existing {
                        None => {
                            let _: Option<Node> =
                                db.client.create(("node", id.as_str())).content(node).await?;
                            Ok(true)
                        }
                        Some(mut current) => {
                            current.merge_properties(&node.properties);
                            current.merge_embedding(node.embedding);
                            current.updated_at = chrono::Utc::now();
                            let _: Option<Node> = db
                                .client
                                .update(("node", id.as_str()))
                                .content(current)
                                .await?;
                            Ok(false)
                        }
                    }
                })
            })
            .await?;
        Ok(UpsertOutcome {
            created,
            merged: !created,
            store,
        })
    }

    /// Matches by `(source_id, target_id, relation)`; on merge, keeps the
    /// higher `confidence` (P3).
    #[instrument(skip(self, edge))]
    pub async fn upsert_edge(&self, edge: Edge) -> Result<UpsertOutcome, GraphRagError> {
        let namespace = namespace_of(&edge.source_id);
        let _guard = self.locks.acquire(&namespace).await;
        let id = edge.id.clone();
        let (created, store) = self
            .with_fallback(move |db| {
                let edge = edge.clone();
                let id = id.clone();
                Box::pin(async move {
                    let existing: Option<Edge> = db.client.select(("edge", id.as_str())).await?;
                    match existing {
                        None => {
                            let _: Option<Edge> =
                                db.client.create(("edge", id.as_str())).content(edge).await?;
                            Ok(true)
                        }
                        Some(mut current) => {
                            current.merge_confidence(edge.confidence);
                            for (key, value) in &edge.properties {
                                current.properties.entry(key.clone()).or_insert(value.clone());
                            }
                            current.updated_at = chrono::Utc::now();
                            let _: Option<Edge> = db
                                .client
                                .update(("edge", id.as_str()))
                                .content(current)
                                .await?;
                            Ok(false)
                        }
                    }
                })
            })
            .await?;
        Ok(UpsertOutcome {
            created,
            merged: !created,
            store,
        })
    }

    pub async fn get_node(&self, id: &str) -> Result<(Option<Node>, StoreTag), GraphRagError> {
        let id = id.to_string();
        self.with_fallback(move |db| {
            let id = id.clone();
            Box::pin(async move {
                let node: Option<Node> = db.client.select(("node", id.as_str())).await?;
                Ok(node)
            })
        })
        .await
    }

    /// Edges and nodes reachable from `id` up to `depth` (clamped to 2),
    /// restricted to `id`'s own namespace (P6).
    #[instrument(skip(self))]
    pub async fn neighbors(&self, id: &str, depth: u8) -> Result<Neighbors, GraphRagError> {
        let depth = depth.min(2);
        let namespace = namespace_of(id);
        let id = id.to_string();
        let ((nodes, edges), store) = self
            .with_fallback(move |db| {
                let id = id.clone();
                let namespace = namespace.clone();
                Box::pin(async move { bfs_neighbors(&db, &id, depth, &namespace).await })
            })
            .await?;
        Ok(Neighbors { nodes, edges, store })
    }

    pub async fn search_by_name(
        &self,
        prefix: &str,
        namespace: &str,
        limit: usize,
    ) -> Result<(Vec<Node>, StoreTag), GraphRagError> {
        let prefix = prefix.to_lowercase();
        let namespace = namespace.to_string();
        self.with_fallback(move |db| {
            let prefix = prefix.clone();
            let namespace = namespace.clone();
            Box::pin(async move {
                let mut result = db
                    .client
                    .query("SELECT * FROM node WHERE namespace = $namespace AND string::lowercase(name)[0..$len] = $prefix ORDER BY name LIMIT $limit")
                    .bind(("namespace", namespace))
                    .bind(("len", prefix.len()))
                    .bind(("prefix", prefix))
                    .bind(("limit", limit))
                    .await?;
                let nodes: Vec<Node> = result.take(0)?;
                Ok(nodes)
            })
        })
        .await
    }

    /// Distinct namespaces with at least one node (`GET /namespaces`, §6).
    pub async fn namespaces(&self) -> Result<(Vec<String>, StoreTag), GraphRagError> {
        self.with_fallback(move |db| {
            Box::pin(async move {
                let mut result = db
                    .client
                    .query("SELECT VALUE namespace FROM node GROUP BY namespace")
                    .await?;
                let namespaces: Vec<String> = result.take(0)?;
                Ok(namespaces)
            })
        })
        .await
    }

    /// Edges touching any of `node_ids` on either end, capped at `limit`
    /// (`GET /edges`, §6). Same chunked-`IN` shape as
    /// [`Self::all_nodes_and_edges`]'s edge query.
    pub async fn edges_for_nodes(&self, node_ids: &[String], limit: usize) -> Result<(Vec<Edge>, StoreTag), GraphRagError> {
        let node_ids = node_ids.to_vec();
        self.with_fallback(move |db| {
            let node_ids = node_ids.clone();
            Box::pin(async move {
                let mut result = db
                    .client
                    .query("SELECT * FROM edge WHERE source_id IN $ids OR target_id IN $ids LIMIT $limit")
                    .bind(("ids", node_ids))
                    .bind(("limit", limit))
                    .await?;
                let edges: Vec<Edge> = result.take(0)?;
                Ok(edges)
            })
        })
        .await
    }

    /// `mode = random`: uniform sample bounded by `sample`. `mode =
    /// viewport`: nodes whose `(layout.x, layout.y)` lies within `bbox`,
    /// also bounded by `sample` (§4.1).
    #[instrument(skip(self))]
    pub async fn sample_subgraph(
        &self,
        namespace: &str,
        mode: SampleMode,
        viewport: Option<Viewport>,
        sample: usize,
    ) -> Result<(Vec<Node>, Vec<Edge>, StoreTag), GraphRagError> {
        let namespace = namespace.to_string();
        let ((nodes, edges), store) = self
            .with_fallback(move |db| {
                let namespace = namespace.clone();
                Box::pin(async move {
                    let nodes: Vec<Node> = match mode {
                        SampleMode::Random => {
                            let mut result = db
                                .client
                                .query("SELECT * FROM node WHERE namespace = $namespace ORDER BY rand() LIMIT $sample")
                                .bind(("namespace", namespace.clone()))
                                .bind(("sample", sample))
                                .await?;
                            result.take(0)?
                        }
                        SampleMode::Viewport => {
                            let viewport = viewport.unwrap_or_default();
                            let mut result = db
                                .client
                                .query(
                                    "SELECT * FROM node WHERE namespace = $namespace \
                                     AND properties.layout.x >= $min_x AND properties.layout.x <= $max_x \
                                     AND properties.layout.y >= $min_y AND properties.layout.y <= $max_y \
                                     LIMIT $sample",
                                )
                                .bind(("namespace", namespace.clone()))
                                .bind(("min_x", viewport.min_x))
                                .bind(("max_x", viewport.max_x))
                                .bind(("min_y", viewport.min_y))
                                .bind(("max_y", viewport.max_y))
                                .bind(("sample", sample))
                                .await?;
                            result.take(0)?
                        }
                    };
                    let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
                    let mut result = db
                        .client
                        .query("SELECT * FROM edge WHERE source_id IN $ids AND target_id IN $ids")
                        .bind(("ids", ids))
                        .await?;
                    let edges: Vec<Edge> = result.take(0)?;
                    Ok((nodes, edges))
                })
            })
            .await?;
        Ok((nodes, edges, store))
    }

    /// Full namespace snapshot for graph-wide analytics (degree, PageRank,
    /// betweenness, community detection): pages through every node via the
    /// same cursor as [`Self::iterate_nodes`], then fetches every edge
    /// touching those ids in `bulk_chunk`-sized batches so the `IN` clause
    /// never grows unbounded (§4.8).
    #[instrument(skip(self))]
    pub async fn all_nodes_and_edges(
        &self,
        namespace: &str,
    ) -> Result<(Vec<Node>, Vec<Edge>), GraphRagError> {
        let mut nodes = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let (page, next_cursor, _store) = self.iterate_nodes(namespace, cursor.as_deref(), 500).await?;
            if page.is_empty() {
                break;
            }
            nodes.extend(page);
            if next_cursor.is_none() {
                break;
            }
            cursor = next_cursor;
        }

        let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        let mut edges = Vec::new();
        for chunk in ids.chunks(self.bulk_chunk) {
            let chunk_ids = chunk.to_vec();
            let (chunk_edges, _store) = self
                .with_fallback(move |db| {
                    let chunk_ids = chunk_ids.clone();
                    Box::pin(async move {
                        let mut result = db
                            .client
                            .query("SELECT * FROM edge WHERE source_id IN $ids AND target_id IN $ids")
                            .bind(("ids", chunk_ids))
                            .await?;
                        let edges: Vec<Edge> = result.take(0)?;
                        Ok(edges)
                    })
                })
                .await?;
            edges.extend(chunk_edges);
        }

        Ok((nodes, edges))
    }

    /// Opaque cursor = last id seen; ids sort lexicographically and new
    /// nodes only ever land after the cursor, so iteration is stable
    /// under concurrent inserts (§4.1).
    pub async fn iterate_nodes(
        &self,
        namespace: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<(Vec<Node>, Option<String>, StoreTag), GraphRagError> {
        let namespace = namespace.to_string();
        let cursor = cursor.map(str::to_string).unwrap_or_default();
        let ((nodes, next_cursor), store) = self
            .with_fallback(move |db| {
                let namespace = namespace.clone();
                let cursor = cursor.clone();
                Box::pin(async move {
                    let mut result = db
                        .client
                        .query("SELECT * FROM node WHERE namespace = $namespace AND id > $cursor ORDER BY id LIMIT $limit")
                        .bind(("namespace", namespace))
                        .bind(("cursor", cursor))
                        .bind(("limit", limit))
                        .await?;
                    let nodes: Vec<Node> = result.take(0)?;
                    let next_cursor = nodes.last().map(|n| n.id.clone());
                    Ok((nodes, next_cursor))
                })
            })
            .await?;
        Ok((nodes, next_cursor, store))
    }

    /// BFS over the `edge` table; backend-optimized traversal is left to
    /// the graph DB when it answers, but the algorithm itself is uniform
    /// across both backends (§4.1).
    #[instrument(skip(self))]
    pub async fn shortest_path(
        &self,
        source_id: &str,
        target_id: &str,
        max_depth: u8,
    ) -> Result<(Option<(Vec<Node>, Vec<Edge>)>, StoreTag), GraphRagError> {
        let source_id = source_id.to_string();
        let target_id = target_id.to_string();
        self.with_fallback(move |db| {
            let source_id = source_id.clone();
            let target_id = target_id.clone();
            Box::pin(async move { bfs_shortest_path(&db, &source_id, &target_id, max_depth).await })
        })
        .await
    }

    /// Overwrites analytics-derived properties (`degree`, `degree_norm`,
    /// `pagerank_norm`, `importance`, `community_id`, `community_level`, ...)
    /// on each named node. Unlike [`Self::upsert_node`]'s union-merge, these
    /// keys are replaced outright since a recompute must supersede the
    /// prior run's values (§4.8).
    #[instrument(skip(self, updates))]
    pub async fn write_analytics_properties(
        &self,
        updates: Vec<(String, Map<String, Value>)>,
    ) -> Result<(), GraphRagError> {
        for chunk in updates.chunks(self.bulk_chunk) {
            let chunk = chunk.to_vec();
            self.with_fallback(move |db| {
                let chunk = chunk.clone();
                Box::pin(async move {
                    for (id, fields) in chunk {
                        let existing: Option<Node> = db.client.select(("node", id.as_str())).await?;
                        let Some(mut node) = existing else { continue };
                        for (key, value) in fields {
                            node.properties.insert(key, value);
                        }
                        node.updated_at = chrono::Utc::now();
                        let _: Option<Node> = db.client.update(("node", id.as_str())).content(node).await?;
                    }
                    Ok(())
                })
            })
            .await?;
        }
        Ok(())
    }

    /// Transactional batch write, chunked at `bulk_chunk` rows (default
    /// 500, §5 backpressure). Each chunk's writes run inside a single
    /// `BEGIN TRANSACTION` / `COMMIT TRANSACTION` block, so a failure
    /// partway through a chunk rolls the whole chunk back rather than
    /// leaving the namespace half-written (§4.1, §4.5). Returns, per
    /// node/edge, whether that row was newly created (for event
    /// publishing) alongside its id.
    #[instrument(skip(self, nodes, edges))]
    pub async fn bulk_upsert(
        &self,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> Result<BulkUpsertOutcome, GraphRagError> {
        let mut node_outcomes = Vec::with_capacity(nodes.len());
        for chunk in nodes.chunks(self.bulk_chunk) {
            node_outcomes.extend(self.upsert_node_batch(chunk).await?);
        }
        let mut edge_outcomes = Vec::with_capacity(edges.len());
        for chunk in edges.chunks(self.bulk_chunk) {
            edge_outcomes.extend(self.upsert_edge_batch(chunk).await?);
        }
        Ok(BulkUpsertOutcome { nodes: node_outcomes, edges: edge_outcomes })
    }

    /// Locks every namespace touched by `nodes`, applies each one's merge
    /// rule ([`Node::merge_properties`]/[`Node::merge_embedding`]) against
    /// a single up-front read, then writes the whole chunk atomically via
    /// [`NODE_BATCH_MUTATION`].
    async fn upsert_node_batch(&self, nodes: &[Node]) -> Result<Vec<NodeUpsertOutcome>, GraphRagError> {
        if nodes.is_empty() {
            return Ok(Vec::new());
        }
        let mut namespaces: Vec<String> = nodes.iter().map(|n| n.namespace.clone()).collect();
        namespaces.sort();
        namespaces.dedup();
        let mut guards = Vec::with_capacity(namespaces.len());
        for namespace in &namespaces {
            guards.push(self.locks.acquire(namespace).await);
        }

        let nodes = nodes.to_vec();
        let (outcomes, _store) = self
            .with_fallback(move |db| {
                let nodes = nodes.clone();
                Box::pin(async move {
                    let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
                    let mut result = db
                        .client
                        .query("SELECT * FROM node WHERE id IN $ids")
                        .bind(("ids", ids))
                        .await?;
                    let existing: Vec<Node> = result.take(0)?;

                    let mut batch: Vec<Value> = Vec::with_capacity(nodes.len());
                    let mut outcomes: Vec<NodeUpsertOutcome> = Vec::with_capacity(nodes.len());
                    for node in &nodes {
                        let current = existing.iter().find(|n| n.id == node.id);
                        let content = match current {
                            None => node.clone(),
                            Some(current) => {
                                let mut merged = current.clone();
                                merged.merge_properties(&node.properties);
                                merged.merge_embedding(node.embedding.clone());
                                merged.updated_at = chrono::Utc::now();
                                merged
                            }
                        };
                        outcomes.push(NodeUpsertOutcome {
                            id: node.id.clone(),
                            label: node.label.as_str().to_string(),
                            created: current.is_none(),
                        });
                        batch.push(json!({ "id": node.id.clone(), "content": content }));
                    }

                    db.client
                        .query(NODE_BATCH_MUTATION)
                        .bind(("batch", batch))
                        .await?;
                    Ok(outcomes)
                })
            })
            .await?;
        drop(guards);
        Ok(outcomes)
    }

    /// Same shape as [`Self::upsert_node_batch`] for edges, applying
    /// [`Edge::merge_confidence`] and the existing-wins property merge.
    async fn upsert_edge_batch(&self, edges: &[Edge]) -> Result<Vec<EdgeUpsertOutcome>, GraphRagError> {
        if edges.is_empty() {
            return Ok(Vec::new());
        }
        let mut namespaces: Vec<String> = edges.iter().map(|e| namespace_of(&e.source_id)).collect();
        namespaces.sort();
        namespaces.dedup();
        let mut guards = Vec::with_capacity(namespaces.len());
        for namespace in &namespaces {
            guards.push(self.locks.acquire(namespace).await);
        }

        let edges = edges.to_vec();
        let (outcomes, _store) = self
            .with_fallback(move |db| {
                let edges = edges.clone();
                Box::pin(async move {
                    let ids: Vec<String> = edges.iter().map(|e| e.id.clone()).collect();
                    let mut result = db
                        .client
                        .query("SELECT * FROM edge WHERE id IN $ids")
                        .bind(("ids", ids))
                        .await?;
                    let existing: Vec<Edge> = result.take(0)?;

                    let mut batch: Vec<Value> = Vec::with_capacity(edges.len());
                    let mut outcomes: Vec<EdgeUpsertOutcome> = Vec::with_capacity(edges.len());
                    for edge in &edges {
                        let current = existing.iter().find(|e| e.id == edge.id);
                        let content = match current {
                            None => edge.clone(),
                            Some(current) => {
                                let mut merged = current.clone();
                                merged.merge_confidence(edge.confidence);
                                for (key, value) in &edge.properties {
                                    merged.properties.entry(key.clone()).or_insert(value.clone());
                                }
                                merged.updated_at = chrono::Utc::now();
                                merged
                            }
                        };
                        outcomes.push(EdgeUpsertOutcome { id: edge.id.clone(), created: current.is_none() });
                        batch.push(json!({ "id": edge.id.clone(), "content": content }));
                    }

                    db.client
                        .query(EDGE_BATCH_MUTATION)
                        .bind(("batch", batch))
                        .await?;
                    Ok(outcomes)
                })
            })
            .await?;
        drop(guards);
        Ok(outcomes)
    }
}

/// Per-node result of [`GraphStore::bulk_upsert`]: enough to decide whether
/// a `node_added` event should be published, without a second read.
#[derive(Debug, Clone)]
pub struct NodeUpsertOutcome {
    pub id: String,
    pub label: String,
    pub created: bool,
}

/// Per-edge result of [`GraphStore::bulk_upsert`].
#[derive(Debug, Clone)]
pub struct EdgeUpsertOutcome {
    pub id: String,
    pub created: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BulkUpsertOutcome {
    pub nodes: Vec<NodeUpsertOutcome>,
    pub edges: Vec<EdgeUpsertOutcome>,
}

/// Batch mutation body shared by every chunk in [`GraphStore::upsert_node_batch`]:
/// one transaction per chunk, so a mid-batch failure leaves no partial writes.
const NODE_BATCH_MUTATION: &str = "
    BEGIN TRANSACTION;
    FOR $item IN $batch {
        UPDATE type::thing('node', $item.id) CONTENT $item.content;
    };
    COMMIT TRANSACTION;
";

const EDGE_BATCH_MUTATION: &str = "
    BEGIN TRANSACTION;
    FOR $item IN $batch {
        UPDATE type::thing('edge', $item.id) CONTENT $item.content;
    };
    COMMIT TRANSACTION;
";

fn namespace_of(node_id: &str) -> String {
    node_id.split(':').next().unwrap_or_default().to_string()
}

async fn bfs_neighbors(
    db: &SurrealDbClient,
    id: &str,
    depth: u8,
    namespace: &str,
) -> Result<(Vec<Node>, Vec<Edge>), GraphRagError> {
    let mut visited_nodes: HashSet<String> = HashSet::from([id.to_string()]);
    let mut collected_edges: Vec<Edge> = Vec::new();
    let mut frontier = vec![id.to_string()];

    for _ in 0..depth.max(1) {
        if frontier.is_empty() {
            break;
        }
        let mut result = db
            .client
            .query("SELECT * FROM edge WHERE source_id IN $ids OR target_id IN $ids")
            .bind(("ids", frontier.clone()))
            .await?;
        let edges: Vec<Edge> = result.take(0)?;
        let mut next_frontier = Vec::new();
        for edge in edges {
            let other = if frontier.contains(&edge.source_id) {
                edge.target_id.clone()
            } else {
                edge.source_id.clone()
            };
            if namespace_of(&other) == namespace && visited_nodes.insert(other.clone()) {
                next_frontier.push(other);
            }
            collected_edges.push(edge);
        }
        frontier = next_frontier;
    }

    visited_nodes.remove(id);
    let ids: Vec<String> = visited_nodes.into_iter().collect();
    let mut result = db
        .client
        .query("SELECT * FROM node WHERE id IN $ids")
        .bind(("ids", ids))
        .await?;
    let nodes: Vec<Node> = result.take(0)?;
    Ok((nodes, collected_edges))
}

async fn bfs_shortest_path(
    db: &SurrealDbClient,
    source_id: &str,
    target_id: &str,
    max_depth: u8,
) -> Result<Option<(Vec<Node>, Vec<Edge>)>, GraphRagError> {
    if source_id == target_id {
        let node: Option<Node> = db.client.select(("node", source_id)).await?;
        return Ok(node.map(|n| (vec![n], vec![])));
    }

    let mut visited: HashSet<String> = HashSet::from([source_id.to_string()]);
    let mut queue: VecDeque<(String, Vec<Edge>)> = VecDeque::from([(source_id.to_string(), vec![])]);

    while let Some((current, path_edges)) = queue.pop_front() {
        if path_edges.len() as u8 > max_depth {
            continue;
        }
        if current == target_id {
            let mut node_ids: Vec<String> = vec![source_id.to_string()];
            node_ids.extend(path_edges.iter().map(|e| {
                if e.source_id == node_ids.last().cloned().unwrap_or_default() {
                    e.target_id.clone()
                } else {
                    e.source_id.clone()
                }
            }));
            let mut result = db
                .client
                .query("SELECT * FROM node WHERE id IN $ids")
                .bind(("ids", node_ids.clone()))
                .await?;
            let fetched: Vec<Node> = result.take(0)?;
            let mut ordered = Vec::with_capacity(node_ids.len());
            for id in &node_ids {
                if let Some(n) = fetched.iter().find(|n| &n.id == id) {
                    ordered.push(n.clone());
                }
            }
            return Ok(Some((ordered, path_edges)));
        }

        if path_edges.len() as u8 >= max_depth {
            continue;
        }

        let mut result = db
            .client
            .query("SELECT * FROM edge WHERE source_id = $id OR target_id = $id")
            .bind(("id", current.clone()))
            .await?;
        let edges: Vec<Edge> = result.take(0)?;
        for edge in edges {
            let other = if edge.source_id == current {
                edge.target_id.clone()
            } else {
                edge.source_id.clone()
            };
            if visited.insert(other.clone()) {
                let mut next_path = path_edges.clone();
                next_path.push(edge);
                queue.push_back((other, next_path));
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::node::NodeLabel;
    use uuid::Uuid;

    async fn store() -> GraphStore {
        let client = SurrealDbClient::memory("public", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        GraphStore::from_embedded(client)
    }

    #[tokio::test]
    async fn upsert_node_creates_then_merges() {
        let store = store().await;
        let node = Node::new_entity("public", NodeLabel::Entity, "OpenAI");
        let first = store.upsert_node(node.clone()).await.unwrap();
        assert!(first.created);

        let mut second = node.clone();
        second
            .properties
            .insert("source_ids".to_string(), json!(["d2"]));
        let outcome = store.upsert_node(second).await.unwrap();
        assert!(!outcome.created);
        assert!(outcome.merged);

        let (fetched, _) = store.get_node(&node.id).await.unwrap();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn upsert_edge_keeps_max_confidence() {
        let store = store().await;
        let edge = Edge::new("public:a", "public:b", crate::storage::types::edge::CO_OCCURS, 0.3);
        store.upsert_edge(edge.clone()).await.unwrap();

        let stronger = Edge::new("public:a", "public:b", crate::storage::types::edge::CO_OCCURS, 0.9);
        store.upsert_edge(stronger).await.unwrap();

        let fetched: Option<Edge> = store
            .primary
            .get_item(&Edge::derive_id("public:a", "public:b", crate::storage::types::edge::CO_OCCURS))
            .await
            .unwrap();
        assert_eq!(fetched.unwrap().confidence, 0.9);
    }

    #[tokio::test]
    async fn bulk_upsert_reports_created_flags_and_persists_both_kinds() {
        let store = store().await;
        let alice = Node::new_entity("public", NodeLabel::Entity, "Alice");
        let acme = Node::new_entity("public", NodeLabel::Organization, "Acme");
        let edge = Edge::new(&alice.id, &acme.id, crate::storage::types::edge::CO_OCCURS, 0.5);

        let outcome = store
            .bulk_upsert(vec![alice.clone(), acme.clone()], vec![edge.clone()])
            .await
            .unwrap();
        assert_eq!(outcome.nodes.len(), 2);
        assert!(outcome.nodes.iter().all(|n| n.created));
        assert_eq!(outcome.edges.len(), 1);
        assert!(outcome.edges[0].created);

        let (fetched_alice, _) = store.get_node(&alice.id).await.unwrap();
        assert!(fetched_alice.is_some());
        let fetched_edge: Option<Edge> = store.primary.get_item(&edge.id).await.unwrap();
        assert!(fetched_edge.is_some());
    }

    #[tokio::test]
    async fn bulk_upsert_merges_on_second_call() {
        let store = store().await;
        let mut node = Node::new_entity("public", NodeLabel::Entity, "Alice");
        store.bulk_upsert(vec![node.clone()], vec![]).await.unwrap();

        node.properties.insert("source_ids".to_string(), json!(["d2"]));
        let outcome = store.bulk_upsert(vec![node.clone()], vec![]).await.unwrap();
        assert!(!outcome.nodes[0].created);

        let (fetched, _) = store.get_node(&node.id).await.unwrap();
        let ids = fetched.unwrap().properties.get("source_ids").unwrap().as_array().unwrap().len();
        assert_eq!(ids, 1);
    }

    #[tokio::test]
    async fn neighbors_stay_within_namespace() {
        let store = store().await;
        store
            .upsert_node(Node::new_entity("public", NodeLabel::Entity, "Alice"))
            .await
            .unwrap();
        store
            .upsert_node(Node::new_entity("public", NodeLabel::Organization, "Acme"))
            .await
            .unwrap();
        store
            .upsert_edge(Edge::new(
                "public:alice",
                "public:acme",
                crate::storage::types::edge::ROLE_AT,
                0.9,
            ))
            .await
            .unwrap();

        let neighbors = store.neighbors("public:alice", 1).await.unwrap();
        assert_eq!(neighbors.nodes.len(), 1);
        assert_eq!(neighbors.nodes[0].id, "public:acme");
    }

    #[tokio::test]
    async fn shortest_path_finds_two_hop_route() {
        let store = store().await;
        store
            .upsert_node(Node::new_entity("public", NodeLabel::Entity, "Alice"))
            .await
            .unwrap();
        store
            .upsert_node(Node::new_entity("public", NodeLabel::Organization, "Acme"))
            .await
            .unwrap();
        store
            .upsert_node(Node::new_entity("public", NodeLabel::Technology, "Kafka"))
            .await
            .unwrap();
        store
            .upsert_edge(Edge::new(
                "public:alice",
                "public:acme",
                crate::storage::types::edge::ROLE_AT,
                0.9,
            ))
            .await
            .unwrap();
        store
            .upsert_edge(Edge::new(
                "public:acme",
                "public:kafka",
                crate::storage::types::edge::USES_TECH,
                0.9,
            ))
            .await
            .unwrap();

        let (path, _) = store
            .shortest_path("public:alice", "public:kafka", 3)
            .await
            .unwrap();
        let (nodes, edges) = path.expect("path should exist");
        assert_eq!(nodes.len(), 3);
        assert_eq!(edges.len(), 2);
    }
}
