//! In-process graph projections: immutable undirected snapshots of a label
//! and relationship subset, keyed by name.
//!
//! A projection is built from [`crate::store::GraphStore::export_subgraph`]
//! and stamped with the graph epoch at build time. Readers get an `Arc`
//! handle; a concurrent refresh swaps the slot without touching handles
//! already given out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

use crate::error::EngineError;
use crate::graph::{NodeLabel, RelType};
use crate::store::SharedStore;
use crate::weighting::GraphEpoch;

/// Which slice of the graph a named projection covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionSpec {
    pub name: String,
    pub labels: Vec<NodeLabel>,
    pub rels: Vec<RelType>,
}

impl ProjectionSpec {
    /// Built-in projection definitions. Unknown names are a validation error
    /// at the call site, not a silent empty projection.
    pub fn by_name(name: &str) -> Option<ProjectionSpec> {
        match name {
            "candidate-skill" => Some(ProjectionSpec {
                name: name.to_string(),
                labels: vec![NodeLabel::Candidate, NodeLabel::Skill],
                rels: vec![RelType::HasSkill],
            }),
            "candidate-feature-full" => Some(ProjectionSpec {
                name: name.to_string(),
                labels: vec![
                    NodeLabel::Candidate,
                    NodeLabel::Skill,
                    NodeLabel::Language,
                    NodeLabel::JobTitle,
                    NodeLabel::Major,
                    NodeLabel::University,
                    NodeLabel::Project,
                ],
                rels: RelType::all().to_vec(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectionNode {
    pub label: NodeLabel,
    pub name: String,
}

/// One undirected adjacency entry. `weight` is `None` for structural edges.
#[derive(Debug, Clone)]
pub struct ProjectionEdge {
    pub to: String,
    pub rel_type: RelType,
    pub weight: Option<f64>,
}

/// Immutable snapshot. Handles stay valid after the slot is refreshed or
/// dropped; `epoch` records the graph epoch the snapshot was built at.
#[derive(Debug)]
pub struct Projection {
    pub name: String,
    pub epoch: u64,
    nodes: HashMap<String, ProjectionNode>,
    adj: HashMap<String, Vec<ProjectionEdge>>,
}

impl Projection {
    pub fn node(&self, uid: &str) -> Option<&ProjectionNode> {
        self.nodes.get(uid)
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.nodes.contains_key(uid)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn neighbors(&self, uid: &str) -> &[ProjectionEdge] {
        self.adj.get(uid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Node uids in stable ascending order.
    pub fn node_uids(&self) -> Vec<&str> {
        let mut uids: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        uids.sort_unstable();
        uids
    }
}

#[derive(Default)]
struct Slot {
    current: Option<Arc<Projection>>,
}

/// Builds, caches, and refreshes named projections.
///
/// Staleness is epoch-based: a cached projection built at an older epoch than
/// the shared [`GraphEpoch`] is rebuilt on the next `ensure`. One build per
/// name runs at a time; concurrent callers wait and reuse the fresh result.
pub struct ProjectionManager {
    store: SharedStore,
    epoch: GraphEpoch,
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Slot>>>>,
}

impl ProjectionManager {
    pub fn new(store: SharedStore, epoch: GraphEpoch) -> Self {
        Self {
            store,
            epoch,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, name: &str) -> Arc<tokio::sync::Mutex<Slot>> {
        let mut slots = self.slots.lock().expect("projection slot map poisoned");
        slots.entry(name.to_string()).or_default().clone()
    }

    /// Return the cached projection, rebuilding first if it is missing or
    /// stale. The returned handle is an immutable snapshot.
    #[instrument(skip(self))]
    pub async fn ensure(&self, name: &str) -> Result<Arc<Projection>, EngineError> {
        let spec = ProjectionSpec::by_name(name)
            .ok_or_else(|| EngineError::Validation(format!("unknown projection: {name}")))?;

        let slot = self.slot(name);
        let mut guard = slot.lock().await;

        let target_epoch = self.epoch.current();
        if let Some(current) = &guard.current {
            if current.epoch == target_epoch {
                return Ok(Arc::clone(current));
            }
        }

        let built = self.build(&spec, target_epoch).await?;
        guard.current = Some(Arc::clone(&built));
        Ok(built)
    }

    /// Cached handle without triggering a rebuild; `None` if the projection
    /// was never built or has been dropped.
    pub async fn get(&self, name: &str) -> Option<Arc<Projection>> {
        let slot = self.slot(name);
        let guard = slot.lock().await;
        guard.current.as_ref().map(Arc::clone)
    }

    /// Drop the cached projection. Returns whether one was present; dropping
    /// an absent name is a no-op, not an error. Outstanding handles keep
    /// working.
    pub async fn drop_projection(&self, name: &str) -> bool {
        let slot = self.slot(name);
        let mut guard = slot.lock().await;
        guard.current.take().is_some()
    }

    async fn build(
        &self,
        spec: &ProjectionSpec,
        epoch: u64,
    ) -> Result<Arc<Projection>, EngineError> {
        let snapshot = self.store.export_subgraph(&spec.labels, &spec.rels).await?;

        let mut nodes = HashMap::with_capacity(snapshot.nodes.len());
        for node in snapshot.nodes {
            nodes.insert(
                node.uid,
                ProjectionNode {
                    label: node.label,
                    name: node.name,
                },
            );
        }

        let mut adj: HashMap<String, Vec<ProjectionEdge>> = HashMap::new();
        let mut edge_count = 0usize;
        for edge in snapshot.edges {
            if !nodes.contains_key(&edge.from_uid) || !nodes.contains_key(&edge.to_uid) {
                continue;
            }
            // Stored edges are directed; path relatedness treats them as
            // undirected, so each edge lands in both adjacency lists.
            adj.entry(edge.from_uid.clone()).or_default().push(ProjectionEdge {
                to: edge.to_uid.clone(),
                rel_type: edge.rel_type,
                weight: edge.weight,
            });
            adj.entry(edge.to_uid).or_default().push(ProjectionEdge {
                to: edge.from_uid,
                rel_type: edge.rel_type,
                weight: edge.weight,
            });
            edge_count += 1;
        }

        // Deterministic neighbor order keeps path tie-breaking stable.
        for neighbors in adj.values_mut() {
            neighbors.sort_by(|a, b| a.to.cmp(&b.to).then(a.rel_type.to_string().cmp(&b.rel_type.to_string())));
        }

        info!(
            name = spec.name,
            epoch,
            nodes = nodes.len(),
            edges = edge_count,
            "projection built"
        );

        Ok(Arc::new(Projection {
            name: spec.name.clone(),
            epoch,
            nodes,
            adj,
        }))
    }
}
