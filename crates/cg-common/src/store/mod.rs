//! Graph store adapter boundary.
//!
//! The engine only depends on the [`GraphStore`] trait; everything else
//! (ranking, weighting, projections) is store-agnostic. Two implementations
//! ship here: an in-memory store used by tests and small deployments, and a
//! Postgres-backed store for the shared graph.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::graph::{AttrMap, FeatureLink, NodeLabel, NodeRecord, RelType, SubgraphSnapshot};

mod memory;
mod migrations;
mod pg;
mod pool;
mod util;

pub use memory::MemoryGraphStore;
pub use migrations::{run_migrations, MigrationError};
pub use pg::PgGraphStore;
pub use pool::{create_pool_from_url, DbPoolError, PgPool};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    /// Transient infrastructure failure (connection, pool, query execution).
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("failed to map stored row: {0}")]
    Mapping(String),
}

pub type SharedStore = Arc<dyn GraphStore>;

/// Capability contract against the persistent property graph.
///
/// Write guarantees the engine relies on:
/// - `upsert_node` merges by `(label, normalized natural key)` so feature
///   nodes stay globally deduplicated;
/// - `upsert_edge` merges by `(from, rel_type, to)` so re-ingestion never
///   duplicates a relationship;
/// - every edge write is atomic per edge (readers never observe a
///   half-written edge).
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn get_node(
        &self,
        label: NodeLabel,
        uid: &str,
    ) -> Result<Option<NodeRecord>, StoreError>;

    /// Lookup by normalized natural key within one label.
    async fn find_node_by_name(
        &self,
        label: NodeLabel,
        name: &str,
    ) -> Result<Option<NodeRecord>, StoreError>;

    /// Create or merge a node; returns its uid. The natural key is
    /// normalized by the store, additional attrs overwrite existing keys.
    async fn upsert_node(
        &self,
        label: NodeLabel,
        natural_key: &str,
        attrs: AttrMap,
    ) -> Result<String, StoreError>;

    /// Create or merge the edge keyed by `(from, rel_type, to)`; returns its
    /// eid. Qualitative attrs overwrite existing keys; the derived weight is
    /// untouched (only [`GraphStore::set_edge_weight`] writes it).
    async fn upsert_edge(
        &self,
        from_uid: &str,
        rel_type: RelType,
        to_uid: &str,
        attrs: AttrMap,
    ) -> Result<String, StoreError>;

    /// Merge qualitative attrs into an existing edge.
    async fn set_edge_attrs(&self, eid: &str, attrs: AttrMap) -> Result<(), StoreError>;

    /// Write the derived weight and its recompute timestamp. Atomic per edge.
    async fn set_edge_weight(
        &self,
        eid: &str,
        weight: f64,
        last_updated: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// All outgoing candidate→feature links with the feature node resolved,
    /// in a stable (rel_type, feature name) order.
    async fn candidate_features(
        &self,
        candidate_uid: &str,
    ) -> Result<Vec<FeatureLink>, StoreError>;

    /// Candidates in stable ascending-uid order, starting strictly after
    /// `after_uid`. This is the pagination contract the resumable batch
    /// recompute depends on.
    async fn list_candidates(
        &self,
        after_uid: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NodeRecord>, StoreError>;

    /// Undirected reachability over the given relationship types, bounded by
    /// `max_hops`. Returns reached node uids excluding the start.
    async fn traverse(
        &self,
        start_uid: &str,
        rel_types: &[RelType],
        max_hops: usize,
    ) -> Result<Vec<String>, StoreError>;

    /// Fetch the subgraph restricted to the given node labels and edge
    /// types, for in-process projection builds.
    async fn export_subgraph(
        &self,
        labels: &[NodeLabel],
        rels: &[RelType],
    ) -> Result<SubgraphSnapshot, StoreError>;
}
