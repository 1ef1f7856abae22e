//! Hop-bounded weighted shortest path over an in-process projection.
//!
//! Cost function: a weighted edge costs `1 - weight` (stronger shared
//! features make candidates "closer"); structural edges carry a fixed cost.
//! The search is deterministic: minimum cost first, then fewer hops, then the
//! lexicographically smallest node sequence.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::graph::{NodeLabel, RelType};
use crate::projection::Projection;

/// Cost of traversing an edge that carries no derived weight.
pub const DEFAULT_STRUCTURAL_COST: f64 = 0.5;

pub fn edge_cost(weight: Option<f64>) -> f64 {
    match weight {
        Some(w) => (1.0 - w).clamp(0.0, 1.0),
        None => DEFAULT_STRUCTURAL_COST,
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PathResult {
    /// Node uids from start to goal inclusive.
    pub nodes: Vec<String>,
    /// Relationship type of each traversed edge; one shorter than `nodes`.
    pub rels: Vec<RelType>,
    pub cost: f64,
    pub hops: usize,
}

struct QueueEntry {
    cost: f64,
    hops: usize,
    nodes: Vec<String>,
    rels: Vec<RelType>,
}

impl QueueEntry {
    fn head(&self) -> &str {
        self.nodes.last().expect("queue entry has at least the start node")
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // Reversed so the max-heap pops the smallest (cost, hops, sequence).
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.hops.cmp(&self.hops))
            .then_with(|| other.nodes.cmp(&self.nodes))
    }
}

/// Shortest path between two nodes, or `None` when no path exists within
/// `max_hops`. Costs are finite; unreachable is a result, never an inflated
/// cost.
pub fn shortest_path(
    projection: &Projection,
    from: &str,
    to: &str,
    max_hops: usize,
) -> Option<PathResult> {
    if !projection.contains(from) || !projection.contains(to) {
        return None;
    }
    if from == to {
        return Some(PathResult {
            nodes: vec![from.to_string()],
            rels: Vec::new(),
            cost: 0.0,
            hops: 0,
        });
    }

    let mut heap = BinaryHeap::new();
    heap.push(QueueEntry {
        cost: 0.0,
        hops: 0,
        nodes: vec![from.to_string()],
        rels: Vec::new(),
    });
    // Best known cost per (node, hops). Keeping the hop count in the key lets
    // a longer-but-cheaper prefix coexist with a shorter-but-pricier one.
    let mut best: HashMap<(String, usize), f64> = HashMap::new();

    while let Some(entry) = heap.pop() {
        let head = entry.head().to_string();
        if head == to {
            return Some(PathResult {
                cost: entry.cost,
                hops: entry.hops,
                nodes: entry.nodes,
                rels: entry.rels,
            });
        }
        if entry.hops == max_hops {
            continue;
        }

        for edge in projection.neighbors(&head) {
            if entry.nodes.iter().any(|n| n == &edge.to) {
                continue;
            }
            let next_cost = entry.cost + edge_cost(edge.weight);
            let next_hops = entry.hops + 1;

            // Prune only strictly worse paths. Equal-cost alternatives stay
            // in the heap so its (cost, hops, sequence) order picks the
            // lexicographically smallest path at the goal.
            let key = (edge.to.clone(), next_hops);
            match best.get(&key) {
                Some(known) if *known < next_cost => continue,
                _ => {
                    best.insert(key, next_cost);
                }
            }

            let mut nodes = entry.nodes.clone();
            nodes.push(edge.to.clone());
            let mut rels = entry.rels.clone();
            rels.push(edge.rel_type);
            heap.push(QueueEntry {
                cost: next_cost,
                hops: next_hops,
                nodes,
                rels,
            });
        }
    }

    None
}

/// Minimum path cost from `from` to every candidate node reachable within
/// `max_hops`, excluding `from` itself.
pub fn candidate_costs(
    projection: &Projection,
    from: &str,
    max_hops: usize,
) -> HashMap<String, f64> {
    let mut reached: HashMap<String, f64> = HashMap::new();
    if !projection.contains(from) {
        return reached;
    }

    let mut heap = BinaryHeap::new();
    heap.push(QueueEntry {
        cost: 0.0,
        hops: 0,
        nodes: vec![from.to_string()],
        rels: Vec::new(),
    });
    let mut best: HashMap<(String, usize), f64> = HashMap::new();

    while let Some(entry) = heap.pop() {
        let head = entry.head().to_string();
        if head != from && projection.node(&head).map(|n| n.label) == Some(NodeLabel::Candidate) {
            reached.entry(head.clone()).or_insert(entry.cost);
        }
        if entry.hops == max_hops {
            continue;
        }

        for edge in projection.neighbors(&head) {
            if entry.nodes.iter().any(|n| n == &edge.to) {
                continue;
            }
            let next_cost = entry.cost + edge_cost(edge.weight);
            let next_hops = entry.hops + 1;

            let key = (edge.to.clone(), next_hops);
            match best.get(&key) {
                Some(known) if *known < next_cost => continue,
                _ => {
                    best.insert(key, next_cost);
                }
            }

            let mut nodes = entry.nodes.clone();
            nodes.push(edge.to.clone());
            heap.push(QueueEntry {
                cost: next_cost,
                hops: next_hops,
                nodes,
                rels: Vec::new(),
            });
        }
    }

    reached
}
