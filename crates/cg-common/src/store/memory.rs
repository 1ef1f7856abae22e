use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{GraphStore, StoreError};
use crate::graph::{
    AttrMap, EdgeRecord, FeatureLink, NodeLabel, NodeRecord, RelType, SubgraphSnapshot,
};
use crate::normalize::natural_key;

/// In-memory graph store. Locking is coarse (one RwLock around the whole
/// graph) which trivially gives the per-edge write atomicity the engine
/// expects; critical sections never span an await point.
#[derive(Default)]
pub struct MemoryGraphStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, NodeRecord>,
    by_key: HashMap<(NodeLabel, String), String>,
    edges: HashMap<String, EdgeRecord>,
    by_triple: HashMap<(String, RelType, String), String>,
    outgoing: HashMap<String, Vec<String>>,
    incoming: HashMap<String, Vec<String>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }
}

impl Inner {
    fn neighbors(&self, uid: &str, rel_types: &[RelType]) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for eids in [self.outgoing.get(uid), self.incoming.get(uid)].into_iter().flatten() {
            for eid in eids {
                if let Some(edge) = self.edges.get(eid) {
                    if !rel_types.is_empty() && !rel_types.contains(&edge.rel_type) {
                        continue;
                    }
                    let other = if edge.from_uid == uid {
                        edge.to_uid.clone()
                    } else {
                        edge.from_uid.clone()
                    };
                    out.push((eid.clone(), other));
                }
            }
        }
        out
    }
}

fn merge_attrs(target: &mut AttrMap, incoming: AttrMap) {
    for (key, value) in incoming {
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn get_node(
        &self,
        label: NodeLabel,
        uid: &str,
    ) -> Result<Option<NodeRecord>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .nodes
            .get(uid)
            .filter(|node| node.label == label)
            .cloned())
    }

    async fn find_node_by_name(
        &self,
        label: NodeLabel,
        name: &str,
    ) -> Result<Option<NodeRecord>, StoreError> {
        let key = natural_key(label, name);
        let inner = self.read()?;
        Ok(inner
            .by_key
            .get(&(label, key))
            .and_then(|uid| inner.nodes.get(uid))
            .cloned())
    }

    async fn upsert_node(
        &self,
        label: NodeLabel,
        raw_key: &str,
        attrs: AttrMap,
    ) -> Result<String, StoreError> {
        let key = natural_key(label, raw_key);
        if key.is_empty() {
            return Err(StoreError::Mapping("natural key must be non-empty".into()));
        }

        let now = Utc::now();
        let mut inner = self.write()?;

        if let Some(uid) = inner.by_key.get(&(label, key.clone())).cloned() {
            let node = inner
                .nodes
                .get_mut(&uid)
                .ok_or_else(|| StoreError::Mapping(format!("dangling key index for {key}")))?;
            merge_attrs(&mut node.attrs, attrs);
            node.updated_at = now;
            return Ok(uid);
        }

        let uid = Uuid::new_v4().to_string();
        inner.by_key.insert((label, key.clone()), uid.clone());
        inner.nodes.insert(
            uid.clone(),
            NodeRecord {
                uid: uid.clone(),
                label,
                name: key,
                attrs,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(uid)
    }

    async fn upsert_edge(
        &self,
        from_uid: &str,
        rel_type: RelType,
        to_uid: &str,
        attrs: AttrMap,
    ) -> Result<String, StoreError> {
        let now = Utc::now();
        let mut inner = self.write()?;

        if !inner.nodes.contains_key(from_uid) {
            return Err(StoreError::NotFound(format!("node {from_uid}")));
        }
        if !inner.nodes.contains_key(to_uid) {
            return Err(StoreError::NotFound(format!("node {to_uid}")));
        }

        let triple = (from_uid.to_string(), rel_type, to_uid.to_string());
        if let Some(eid) = inner.by_triple.get(&triple).cloned() {
            let edge = inner
                .edges
                .get_mut(&eid)
                .ok_or_else(|| StoreError::Mapping(format!("dangling edge index for {eid}")))?;
            merge_attrs(&mut edge.attrs, attrs);
            edge.last_updated = now;
            return Ok(eid);
        }

        let eid = Uuid::new_v4().to_string();
        inner.by_triple.insert(triple, eid.clone());
        inner
            .outgoing
            .entry(from_uid.to_string())
            .or_default()
            .push(eid.clone());
        inner
            .incoming
            .entry(to_uid.to_string())
            .or_default()
            .push(eid.clone());
        inner.edges.insert(
            eid.clone(),
            EdgeRecord {
                eid: eid.clone(),
                from_uid: from_uid.to_string(),
                rel_type,
                to_uid: to_uid.to_string(),
                attrs,
                weight: None,
                last_updated: now,
            },
        );
        Ok(eid)
    }

    async fn set_edge_attrs(&self, eid: &str, attrs: AttrMap) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let edge = inner
            .edges
            .get_mut(eid)
            .ok_or_else(|| StoreError::NotFound(format!("edge {eid}")))?;
        merge_attrs(&mut edge.attrs, attrs);
        edge.last_updated = Utc::now();
        Ok(())
    }

    async fn set_edge_weight(
        &self,
        eid: &str,
        weight: f64,
        last_updated: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let edge = inner
            .edges
            .get_mut(eid)
            .ok_or_else(|| StoreError::NotFound(format!("edge {eid}")))?;
        edge.weight = Some(weight);
        edge.last_updated = last_updated;
        Ok(())
    }

    async fn candidate_features(
        &self,
        candidate_uid: &str,
    ) -> Result<Vec<FeatureLink>, StoreError> {
        let inner = self.read()?;
        if !inner.nodes.contains_key(candidate_uid) {
            return Err(StoreError::NotFound(format!("candidate {candidate_uid}")));
        }

        let mut links: Vec<FeatureLink> = inner
            .outgoing
            .get(candidate_uid)
            .into_iter()
            .flatten()
            .filter_map(|eid| inner.edges.get(eid))
            .filter_map(|edge| {
                let feature = inner.nodes.get(&edge.to_uid)?;
                Some(FeatureLink {
                    edge: edge.clone(),
                    feature_uid: feature.uid.clone(),
                    feature_label: feature.label,
                    feature_name: feature.name.clone(),
                })
            })
            .collect();

        links.sort_by(|a, b| {
            (a.edge.rel_type.to_string(), &a.feature_name)
                .cmp(&(b.edge.rel_type.to_string(), &b.feature_name))
        });
        Ok(links)
    }

    async fn list_candidates(
        &self,
        after_uid: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NodeRecord>, StoreError> {
        let inner = self.read()?;
        let mut candidates: Vec<NodeRecord> = inner
            .nodes
            .values()
            .filter(|node| node.label == NodeLabel::Candidate)
            .filter(|node| after_uid.map_or(true, |after| node.uid.as_str() > after))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| a.uid.cmp(&b.uid));
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn traverse(
        &self,
        start_uid: &str,
        rel_types: &[RelType],
        max_hops: usize,
    ) -> Result<Vec<String>, StoreError> {
        let inner = self.read()?;
        if !inner.nodes.contains_key(start_uid) {
            return Err(StoreError::NotFound(format!("node {start_uid}")));
        }

        let mut seen: HashSet<String> = HashSet::from([start_uid.to_string()]);
        let mut frontier: VecDeque<(String, usize)> = VecDeque::from([(start_uid.to_string(), 0)]);
        let mut reached = Vec::new();

        while let Some((uid, hops)) = frontier.pop_front() {
            if hops == max_hops {
                continue;
            }
            for (_, next) in inner.neighbors(&uid, rel_types) {
                if seen.insert(next.clone()) {
                    reached.push(next.clone());
                    frontier.push_back((next, hops + 1));
                }
            }
        }

        reached.sort();
        Ok(reached)
    }

    async fn export_subgraph(
        &self,
        labels: &[NodeLabel],
        rels: &[RelType],
    ) -> Result<SubgraphSnapshot, StoreError> {
        let inner = self.read()?;

        let mut nodes: Vec<NodeRecord> = inner
            .nodes
            .values()
            .filter(|node| labels.is_empty() || labels.contains(&node.label))
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.uid.cmp(&b.uid));

        let kept: HashSet<&str> = nodes.iter().map(|n| n.uid.as_str()).collect();
        let mut edges: Vec<EdgeRecord> = inner
            .edges
            .values()
            .filter(|edge| rels.is_empty() || rels.contains(&edge.rel_type))
            .filter(|edge| kept.contains(edge.from_uid.as_str()) && kept.contains(edge.to_uid.as_str()))
            .cloned()
            .collect();
        edges.sort_by(|a, b| a.eid.cmp(&b.eid));

        Ok(SubgraphSnapshot { nodes, edges })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: serde_json::Value) -> AttrMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn feature_nodes_deduplicate_by_normalized_name() {
        let store = MemoryGraphStore::new();
        let a = store
            .upsert_node(NodeLabel::Skill, "Python", AttrMap::new())
            .await
            .unwrap();
        let b = store
            .upsert_node(NodeLabel::Skill, "  PYTHON ", AttrMap::new())
            .await
            .unwrap();
        let c = store
            .upsert_node(NodeLabel::Skill, "rust", AttrMap::new())
            .await
            .unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);

        let found = store
            .find_node_by_name(NodeLabel::Skill, "python")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.uid, a);
        assert_eq!(found.name, "python");
    }

    #[tokio::test]
    async fn skill_aliases_share_one_node() {
        let store = MemoryGraphStore::new();
        let a = store
            .upsert_node(NodeLabel::Skill, "k8s", AttrMap::new())
            .await
            .unwrap();
        let b = store
            .upsert_node(NodeLabel::Skill, "Kubernetes", AttrMap::new())
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn relinking_merges_into_the_existing_edge() {
        let store = MemoryGraphStore::new();
        let cand = store
            .upsert_node(NodeLabel::Candidate, "ada", AttrMap::new())
            .await
            .unwrap();
        let skill = store
            .upsert_node(NodeLabel::Skill, "python", AttrMap::new())
            .await
            .unwrap();

        let first = store
            .upsert_edge(&cand, RelType::HasSkill, &skill, attrs(json!({"level": "beginner"})))
            .await
            .unwrap();
        let second = store
            .upsert_edge(&cand, RelType::HasSkill, &skill, attrs(json!({"level": "expert"})))
            .await
            .unwrap();

        assert_eq!(first, second);
        let links = store.candidate_features(&cand).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].edge.attr_str("level"), Some("expert"));
    }

    #[tokio::test]
    async fn set_edge_weight_does_not_touch_attrs() {
        let store = MemoryGraphStore::new();
        let cand = store
            .upsert_node(NodeLabel::Candidate, "ada", AttrMap::new())
            .await
            .unwrap();
        let skill = store
            .upsert_node(NodeLabel::Skill, "python", AttrMap::new())
            .await
            .unwrap();
        let eid = store
            .upsert_edge(&cand, RelType::HasSkill, &skill, attrs(json!({"level": "expert"})))
            .await
            .unwrap();

        store.set_edge_weight(&eid, 0.9, Utc::now()).await.unwrap();

        let links = store.candidate_features(&cand).await.unwrap();
        assert_eq!(links[0].edge.weight, Some(0.9));
        assert_eq!(links[0].edge.attr_str("level"), Some("expert"));
    }

    #[tokio::test]
    async fn list_candidates_paginates_in_stable_uid_order() {
        let store = MemoryGraphStore::new();
        for name in ["ada", "grace", "linus", "barbara"] {
            store
                .upsert_node(NodeLabel::Candidate, name, AttrMap::new())
                .await
                .unwrap();
        }

        let first_page = store.list_candidates(None, 2).await.unwrap();
        assert_eq!(first_page.len(), 2);
        let rest = store
            .list_candidates(Some(&first_page[1].uid), 10)
            .await
            .unwrap();
        assert_eq!(rest.len(), 2);

        let mut all: Vec<String> = first_page
            .iter()
            .chain(rest.iter())
            .map(|n| n.uid.clone())
            .collect();
        let sorted = {
            let mut s = all.clone();
            s.sort();
            s
        };
        assert_eq!(all.len(), 4);
        all.dedup();
        assert_eq!(all, sorted);
    }

    #[tokio::test]
    async fn traverse_is_hop_bounded_and_undirected() {
        let store = MemoryGraphStore::new();
        let ada = store
            .upsert_node(NodeLabel::Candidate, "ada", AttrMap::new())
            .await
            .unwrap();
        let grace = store
            .upsert_node(NodeLabel::Candidate, "grace", AttrMap::new())
            .await
            .unwrap();
        let python = store
            .upsert_node(NodeLabel::Skill, "python", AttrMap::new())
            .await
            .unwrap();

        store
            .upsert_edge(&ada, RelType::HasSkill, &python, AttrMap::new())
            .await
            .unwrap();
        store
            .upsert_edge(&grace, RelType::HasSkill, &python, AttrMap::new())
            .await
            .unwrap();

        let one_hop = store
            .traverse(&ada, &[RelType::HasSkill], 1)
            .await
            .unwrap();
        assert_eq!(one_hop, vec![python.clone()]);

        let two_hops = store
            .traverse(&ada, &[RelType::HasSkill], 2)
            .await
            .unwrap();
        assert!(two_hops.contains(&grace));
        assert!(two_hops.contains(&python));
    }

    #[tokio::test]
    async fn export_subgraph_filters_labels_and_rel_types() {
        let store = MemoryGraphStore::new();
        let ada = store
            .upsert_node(NodeLabel::Candidate, "ada", AttrMap::new())
            .await
            .unwrap();
        let python = store
            .upsert_node(NodeLabel::Skill, "python", AttrMap::new())
            .await
            .unwrap();
        let title = store
            .upsert_node(NodeLabel::JobTitle, "engineer", AttrMap::new())
            .await
            .unwrap();
        store
            .upsert_edge(&ada, RelType::HasSkill, &python, AttrMap::new())
            .await
            .unwrap();
        store
            .upsert_edge(&ada, RelType::HasTitle, &title, AttrMap::new())
            .await
            .unwrap();

        let snapshot = store
            .export_subgraph(
                &[NodeLabel::Candidate, NodeLabel::Skill],
                &[RelType::HasSkill],
            )
            .await
            .unwrap();

        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.edges.len(), 1);
        assert_eq!(snapshot.edges[0].rel_type, RelType::HasSkill);
    }
}
