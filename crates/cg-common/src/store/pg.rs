use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::PoolError;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use tokio_postgres::{Error as PgError, Row};
use tracing::instrument;
use uuid::Uuid;

use super::util::TimedClientExt;
use super::{GraphStore, PgPool, StoreError};
use crate::graph::{
    AttrMap, EdgeRecord, FeatureLink, NodeLabel, NodeRecord, RelType, SubgraphSnapshot,
};
use crate::normalize::natural_key;

/// Postgres-backed graph store. Nodes merge on `(label, natural_key)`,
/// edges on `(from, rel_type, to)`; both via `ON CONFLICT` upserts, which
/// gives the per-row write atomicity the engine relies on.
pub struct PgGraphStore {
    pool: PgPool,
}

impl PgGraphStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, StoreError> {
        self.pool.get().await.map_err(pool_err)
    }
}

fn pool_err(err: PoolError) -> StoreError {
    StoreError::Unavailable(format!("postgres pool: {err}"))
}

fn pg_err(err: PgError) -> StoreError {
    StoreError::Unavailable(format!("postgres: {err}"))
}

fn attrs_from_value(value: Value) -> AttrMap {
    match value {
        Value::Object(map) => map,
        _ => AttrMap::new(),
    }
}

fn node_from_row(row: &Row) -> Result<NodeRecord, StoreError> {
    let label_raw: String = row.get("label");
    let label = label_raw
        .parse::<NodeLabel>()
        .map_err(|_| StoreError::Mapping(format!("unknown node label: {label_raw}")))?;

    Ok(NodeRecord {
        uid: row.get("uid"),
        label,
        name: row.get("natural_key"),
        attrs: attrs_from_value(row.get("attrs")),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn edge_from_row(row: &Row) -> Result<EdgeRecord, StoreError> {
    let rel_raw: String = row.get("rel_type");
    let rel_type = rel_raw
        .parse::<RelType>()
        .map_err(|_| StoreError::Mapping(format!("unknown rel type: {rel_raw}")))?;

    Ok(EdgeRecord {
        eid: row.get("eid"),
        from_uid: row.get("from_uid"),
        rel_type,
        to_uid: row.get("to_uid"),
        attrs: attrs_from_value(row.get("attrs")),
        weight: row.get("weight"),
        last_updated: row.get("last_updated"),
    })
}

fn rel_strings(rels: &[RelType]) -> Vec<String> {
    rels.iter().map(RelType::to_string).collect()
}

#[async_trait]
impl GraphStore for PgGraphStore {
    #[instrument(skip(self))]
    async fn get_node(
        &self,
        label: NodeLabel,
        uid: &str,
    ) -> Result<Option<NodeRecord>, StoreError> {
        let client = self.client().await?;
        let row = client
            .timed_query_opt_cached(
                "SELECT uid, label, natural_key, attrs, created_at, updated_at
                 FROM cg.graph_nodes WHERE uid = $1 AND label = $2",
                &[&uid, &label.to_string()],
                "get_node",
            )
            .await
            .map_err(pg_err)?;
        row.as_ref().map(node_from_row).transpose()
    }

    async fn find_node_by_name(
        &self,
        label: NodeLabel,
        name: &str,
    ) -> Result<Option<NodeRecord>, StoreError> {
        let key = natural_key(label, name);
        let client = self.client().await?;
        let row = client
            .timed_query_opt_cached(
                "SELECT uid, label, natural_key, attrs, created_at, updated_at
                 FROM cg.graph_nodes WHERE label = $1 AND natural_key = $2",
                &[&label.to_string(), &key],
                "find_node_by_name",
            )
            .await
            .map_err(pg_err)?;
        row.as_ref().map(node_from_row).transpose()
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

        let uid = Uuid::new_v4().to_string();
        let attrs = Value::Object(attrs);
        let client = self.client().await?;
        let row = client
            .timed_query_one_cached(
                "INSERT INTO cg.graph_nodes (uid, label, natural_key, attrs)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (label, natural_key) DO UPDATE
                 SET attrs = jsonb_strip_nulls(cg.graph_nodes.attrs || EXCLUDED.attrs),
                     updated_at = NOW()
                 RETURNING uid",
                &[&uid, &label.to_string(), &key, &attrs],
                "upsert_node",
            )
            .await
            .map_err(pg_err)?;
        Ok(row.get("uid"))
    }

    async fn upsert_edge(
        &self,
        from_uid: &str,
        rel_type: RelType,
        to_uid: &str,
        attrs: AttrMap,
    ) -> Result<String, StoreError> {
        let eid = Uuid::new_v4().to_string();
        let attrs = Value::Object(attrs);
        let client = self.client().await?;
        let result = client
            .timed_query_one_cached(
                "INSERT INTO cg.graph_edges (eid, from_uid, rel_type, to_uid, attrs)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (from_uid, rel_type, to_uid) DO UPDATE
                 SET attrs = jsonb_strip_nulls(cg.graph_edges.attrs || EXCLUDED.attrs),
                     last_updated = NOW()
                 RETURNING eid",
                &[&eid, &from_uid, &rel_type.to_string(), &to_uid, &attrs],
                "upsert_edge",
            )
            .await;

        match result {
            Ok(row) => Ok(row.get("eid")),
            // FK violation means a missing endpoint, not an infra failure.
            Err(err) if err.code() == Some(&tokio_postgres::error::SqlState::FOREIGN_KEY_VIOLATION) => {
                Err(StoreError::NotFound(format!(
                    "edge endpoint missing: {from_uid} or {to_uid}"
                )))
            }
            Err(err) => Err(pg_err(err)),
        }
    }

    async fn set_edge_attrs(&self, eid: &str, attrs: AttrMap) -> Result<(), StoreError> {
        let attrs = Value::Object(attrs);
        let client = self.client().await?;
        let updated = client
            .timed_execute_cached(
                "UPDATE cg.graph_edges
                 SET attrs = jsonb_strip_nulls(attrs || $2), last_updated = NOW()
                 WHERE eid = $1",
                &[&eid, &attrs],
                "set_edge_attrs",
            )
            .await
            .map_err(pg_err)?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("edge {eid}")));
        }
        Ok(())
    }

    async fn set_edge_weight(
        &self,
        eid: &str,
        weight: f64,
        last_updated: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let client = self.client().await?;
        let updated = client
            .timed_execute_cached(
                "UPDATE cg.graph_edges SET weight = $2, last_updated = $3 WHERE eid = $1",
                &[&eid, &weight, &last_updated],
                "set_edge_weight",
            )
            .await
            .map_err(pg_err)?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("edge {eid}")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn candidate_features(
        &self,
        candidate_uid: &str,
    ) -> Result<Vec<FeatureLink>, StoreError> {
        let client = self.client().await?;
        let rows = client
            .timed_query_cached(
                "SELECT e.eid, e.from_uid, e.rel_type, e.to_uid, e.attrs, e.weight, e.last_updated,
                        n.uid AS feature_uid, n.label AS feature_label, n.natural_key AS feature_name
                 FROM cg.graph_edges e
                 JOIN cg.graph_nodes n ON n.uid = e.to_uid
                 WHERE e.from_uid = $1
                 ORDER BY e.rel_type, n.natural_key",
                &[&candidate_uid],
                "candidate_features",
            )
            .await
            .map_err(pg_err)?;

        rows.iter()
            .map(|row| {
                let edge = edge_from_row(row)?;
                let label_raw: String = row.get("feature_label");
                let feature_label = label_raw
                    .parse::<NodeLabel>()
                    .map_err(|_| StoreError::Mapping(format!("unknown node label: {label_raw}")))?;
                Ok(FeatureLink {
                    edge,
                    feature_uid: row.get("feature_uid"),
                    feature_label,
                    feature_name: row.get("feature_name"),
                })
            })
            .collect()
    }

    async fn list_candidates(
        &self,
        after_uid: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NodeRecord>, StoreError> {
        let client = self.client().await?;
        let limit = limit.min(i64::MAX as usize) as i64;
        let rows = client
            .timed_query_cached(
                "SELECT uid, label, natural_key, attrs, created_at, updated_at
                 FROM cg.graph_nodes
                 WHERE label = 'candidate' AND ($1::TEXT IS NULL OR uid > $1)
                 ORDER BY uid
                 LIMIT $2",
                &[&after_uid, &limit],
                "list_candidates",
            )
            .await
            .map_err(pg_err)?;
        rows.iter().map(node_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn traverse(
        &self,
        start_uid: &str,
        rel_types: &[RelType],
        max_hops: usize,
    ) -> Result<Vec<String>, StoreError> {
        let client = self.client().await?;
        let rels = rel_strings(if rel_types.is_empty() {
            RelType::all()
        } else {
            rel_types
        });

        let mut seen: HashSet<String> = HashSet::from([start_uid.to_string()]);
        let mut frontier: VecDeque<(String, usize)> = VecDeque::from([(start_uid.to_string(), 0)]);
        let mut reached = Vec::new();

        // One query per hop over the whole frontier; hop counts are small
        // (bounded by max_hops), so this stays at most max_hops round-trips.
        while let Some((uid, hops)) = frontier.pop_front() {
            if hops == max_hops {
                continue;
            }
            let mut batch = vec![uid];
            while let Some((next, h)) = frontier.front() {
                if *h == hops {
                    batch.push(next.clone());
                    frontier.pop_front();
                } else {
                    break;
                }
            }

            let rows = client
                .timed_query_cached(
                    "SELECT from_uid, to_uid FROM cg.graph_edges
                     WHERE (from_uid = ANY($1) OR to_uid = ANY($1)) AND rel_type = ANY($2)",
                    &[&batch, &rels],
                    "traverse_hop",
                )
                .await
                .map_err(pg_err)?;

            for row in rows {
                let from: String = row.get("from_uid");
                let to: String = row.get("to_uid");
                for node in [from, to] {
                    if seen.insert(node.clone()) {
                        reached.push(node.clone());
                        frontier.push_back((node, hops + 1));
                    }
                }
            }
        }

        reached.sort();
        Ok(reached)
    }

    #[instrument(skip(self))]
    async fn export_subgraph(
        &self,
        labels: &[NodeLabel],
        rels: &[RelType],
    ) -> Result<SubgraphSnapshot, StoreError> {
        let client = self.client().await?;

        let label_strings: Vec<String> = labels.iter().map(NodeLabel::to_string).collect();
        let node_rows = client
            .timed_query_cached(
                "SELECT uid, label, natural_key, attrs, created_at, updated_at
                 FROM cg.graph_nodes
                 WHERE cardinality($1::TEXT[]) = 0 OR label = ANY($1)
                 ORDER BY uid",
                &[&label_strings],
                "export_nodes",
            )
            .await
            .map_err(pg_err)?;
        let nodes: Vec<NodeRecord> = node_rows
            .iter()
            .map(node_from_row)
            .collect::<Result<_, _>>()?;

        let kept: HashSet<&str> = nodes.iter().map(|n| n.uid.as_str()).collect();
        let rel_list = rel_strings(rels);
        let edge_rows = client
            .timed_query_cached(
                "SELECT eid, from_uid, rel_type, to_uid, attrs, weight, last_updated
                 FROM cg.graph_edges
                 WHERE cardinality($1::TEXT[]) = 0 OR rel_type = ANY($1)
                 ORDER BY eid",
                &[&rel_list],
                "export_edges",
            )
            .await
            .map_err(pg_err)?;
        let edges = edge_rows
            .iter()
            .map(edge_from_row)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|edge| {
                kept.contains(edge.from_uid.as_str()) && kept.contains(edge.to_uid.as_str())
            })
            .collect();

        Ok(SubgraphSnapshot { nodes, edges })
    }
}
