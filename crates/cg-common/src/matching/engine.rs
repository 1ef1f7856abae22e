//! Recommendation engine: hard-filtered search, weighted soft scoring, and
//! path-based relatedness over the shared graph.
//!
//! All public operations are stateless per request and safe to run
//! concurrently. Each takes an optional deadline; exceeding it surfaces as
//! [`EngineError::Timeout`] rather than a partial result.

use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::EngineError;
use crate::graph::{FeatureLink, NodeLabel, NodeRecord, RelType};
use crate::matching::criteria::{
    LanguageClause, MatchCriteria, MustHave, NiceToHave, SearchCriteria, SkillClause,
};
use crate::matching::paths::{self, PathResult};
use crate::normalize::{natural_key, normalize_name};
use crate::projection::ProjectionManager;
use crate::store::SharedStore;
use crate::weight::{language_level_num, skill_level_num, LOWEST_BASE};

const CANDIDATE_PAGE: usize = 200;

/// One clause's share of a match score, attached when `explain` is set.
#[derive(Debug, Clone, Serialize)]
pub struct ClauseContribution {
    pub clause: String,
    pub contribution: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub candidate_uid: String,
    pub name: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<Vec<ClauseContribution>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelatedCandidate {
    pub candidate_uid: String,
    pub name: String,
    pub cost: f64,
}

pub struct RecommendationEngine {
    store: SharedStore,
    projections: Arc<ProjectionManager>,
}

impl RecommendationEngine {
    pub fn new(store: SharedStore, projections: Arc<ProjectionManager>) -> Self {
        Self { store, projections }
    }

    /// Hard filter only: candidates satisfying every must-have clause, in
    /// stable ascending-uid order, paginated by `skip`/`limit`.
    #[instrument(skip(self, criteria))]
    pub async fn search(
        &self,
        criteria: &SearchCriteria,
        deadline: Option<Duration>,
    ) -> Result<Vec<NodeRecord>, EngineError> {
        criteria.validate()?;
        with_deadline(deadline, "search", self.search_inner(criteria)).await
    }

    async fn search_inner(&self, criteria: &SearchCriteria) -> Result<Vec<NodeRecord>, EngineError> {
        let eligible = self.filter_candidates(&criteria.must_have).await?;
        Ok(eligible
            .into_iter()
            .map(|(node, _)| node)
            .skip(criteria.skip)
            .take(criteria.limit)
            .collect())
    }

    /// Filter then score: survivors of the must-have filter ranked by the
    /// weighted sum of matched nice-to-have clauses, descending, ties broken
    /// by candidate uid. `top_k` truncates after sorting.
    #[instrument(skip(self, criteria))]
    pub async fn match_candidates(
        &self,
        criteria: &MatchCriteria,
        deadline: Option<Duration>,
    ) -> Result<Vec<MatchResult>, EngineError> {
        criteria.validate()?;
        with_deadline(deadline, "match", self.match_inner(criteria)).await
    }

    async fn match_inner(&self, criteria: &MatchCriteria) -> Result<Vec<MatchResult>, EngineError> {
        let eligible = self.filter_candidates(&criteria.must_have).await?;

        // The proximity boost needs one Dijkstra pass from the anchor, shared
        // across all scored candidates.
        let related_costs = match &criteria.nice_to_have.related_to {
            Some(related) => {
                let projection = self.projections.ensure(&related.projection).await?;
                Some((
                    related,
                    paths::candidate_costs(&projection, &related.candidate_uid, related.max_hops),
                ))
            }
            None => None,
        };

        let max_score = criteria.nice_to_have.max_score();
        let mut results: Vec<MatchResult> = eligible
            .into_iter()
            .map(|(node, links)| {
                let (mut score, contributions) = score_candidate(
                    &criteria.nice_to_have,
                    &node,
                    &links,
                    related_costs.as_ref(),
                );
                if criteria.normalize && max_score > 0.0 {
                    score /= max_score;
                }
                MatchResult {
                    candidate_uid: node.uid,
                    name: candidate_display_name(&node.name, &node.attrs),
                    score,
                    explain: criteria.explain.then_some(contributions),
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.candidate_uid.cmp(&b.candidate_uid))
        });
        results.truncate(criteria.top_k);

        debug!(returned = results.len(), "match ranked");
        Ok(results)
    }

    /// Weighted shortest path between two candidates over a named projection.
    /// `Ok(None)` means no path within `max_hops`, which is a legitimate
    /// outcome; unknown candidates are `NotFound`.
    #[instrument(skip(self))]
    pub async fn shortest_path(
        &self,
        candidate_a: &str,
        candidate_b: &str,
        max_hops: usize,
        projection_name: &str,
        deadline: Option<Duration>,
    ) -> Result<Option<PathResult>, EngineError> {
        if max_hops == 0 {
            return Err(EngineError::Validation(
                "max_hops must be at least 1".to_string(),
            ));
        }
        with_deadline(deadline, "shortest_path", async {
            self.require_candidate(candidate_a).await?;
            self.require_candidate(candidate_b).await?;
            let projection = self.projections.ensure(projection_name).await?;
            Ok(paths::shortest_path(
                &projection,
                candidate_a,
                candidate_b,
                max_hops,
            ))
        })
        .await
    }

    /// Candidates related to the anchor, ranked ascending by path cost with
    /// uid tie-breaks. Unreachable candidates are excluded, not scored.
    #[instrument(skip(self))]
    pub async fn related_candidates(
        &self,
        candidate_uid: &str,
        top_k: usize,
        max_hops: usize,
        projection_name: &str,
        deadline: Option<Duration>,
    ) -> Result<Vec<RelatedCandidate>, EngineError> {
        if top_k == 0 {
            return Err(EngineError::Validation(
                "top_k must be at least 1".to_string(),
            ));
        }
        if max_hops == 0 {
            return Err(EngineError::Validation(
                "max_hops must be at least 1".to_string(),
            ));
        }

        with_deadline(deadline, "related_candidates", async {
            self.require_candidate(candidate_uid).await?;
            let projection = self.projections.ensure(projection_name).await?;
            let costs = paths::candidate_costs(&projection, candidate_uid, max_hops);

            let mut ranked: Vec<RelatedCandidate> = Vec::with_capacity(costs.len());
            for (uid, cost) in costs {
                let name = projection
                    .node(&uid)
                    .map(|n| n.name.clone())
                    .unwrap_or_else(|| uid.clone());
                ranked.push(RelatedCandidate {
                    candidate_uid: uid,
                    name,
                    cost,
                });
            }
            ranked.sort_by(|a, b| {
                a.cost
                    .total_cmp(&b.cost)
                    .then_with(|| a.candidate_uid.cmp(&b.candidate_uid))
            });
            ranked.truncate(top_k);
            Ok(ranked)
        })
        .await
    }

    async fn require_candidate(&self, uid: &str) -> Result<NodeRecord, EngineError> {
        self.store
            .get_node(NodeLabel::Candidate, uid)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("candidate {uid}")))
    }

    /// All candidates passing every must-have clause, with their feature
    /// links, in ascending uid order.
    async fn filter_candidates(
        &self,
        must_have: &MustHave,
    ) -> Result<Vec<(NodeRecord, Vec<FeatureLink>)>, EngineError> {
        let mut eligible = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .store
                .list_candidates(cursor.as_deref(), CANDIDATE_PAGE)
                .await?;
            if page.is_empty() {
                break;
            }
            cursor = page.last().map(|node| node.uid.clone());

            for node in page {
                let links = self.store.candidate_features(&node.uid).await?;
                if passes_must_have(must_have, &node, &links) {
                    eligible.push((node, links));
                }
            }
        }

        Ok(eligible)
    }
}

async fn with_deadline<T>(
    deadline: Option<Duration>,
    op: &str,
    fut: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    match deadline {
        Some(budget) => tokio::time::timeout(budget, fut)
            .await
            .map_err(|_| EngineError::Timeout(format!("{op} exceeded {budget:?}")))?,
        None => fut.await,
    }
}

fn candidate_display_name(natural_key: &str, attrs: &crate::graph::AttrMap) -> String {
    attrs
        .get("name")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| natural_key.to_string())
}

fn find_link<'a>(
    links: &'a [FeatureLink],
    rel: RelType,
    label: NodeLabel,
    raw_name: &str,
) -> Option<&'a FeatureLink> {
    let key = natural_key(label, raw_name);
    links
        .iter()
        .find(|link| link.edge.rel_type == rel && link.feature_name == key)
}

fn skill_clause_satisfied<'a>(
    clause: &SkillClause,
    links: &'a [FeatureLink],
) -> Option<&'a FeatureLink> {
    let link = find_link(links, RelType::HasSkill, NodeLabel::Skill, &clause.name)?;
    if let Some(min_level) = clause.min_level {
        if skill_level_num(link.edge.attr_str("level")) < min_level.level_num() {
            return None;
        }
    }
    if let Some(min_years) = clause.min_years {
        // Years are only enforced where the edge actually tracks them.
        if let Some(years) = link.edge.attr_f64("years") {
            if years < min_years {
                return None;
            }
        }
    }
    Some(link)
}

fn language_clause_satisfied<'a>(
    clause: &LanguageClause,
    links: &'a [FeatureLink],
) -> Option<&'a FeatureLink> {
    let link = find_link(links, RelType::Speaks, NodeLabel::Language, &clause.name)?;
    if let Some(min_level) = clause.min_level {
        if language_level_num(link.edge.attr_str("level")) < min_level.level_num() {
            return None;
        }
    }
    Some(link)
}

fn location_matches(entry: &str, node: &NodeRecord) -> bool {
    let wanted = normalize_name(entry);
    if wanted == "remote" {
        let remote_ok = node
            .attrs
            .get("remote_ok")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if remote_ok {
            return true;
        }
    }
    node.attrs
        .get("location")
        .and_then(serde_json::Value::as_str)
        .map(|loc| normalize_name(loc) == wanted)
        .unwrap_or(false)
}

fn passes_must_have(must: &MustHave, node: &NodeRecord, links: &[FeatureLink]) -> bool {
    for clause in &must.skills {
        if skill_clause_satisfied(clause, links).is_none() {
            return false;
        }
    }
    for clause in &must.languages {
        if language_clause_satisfied(clause, links).is_none() {
            return false;
        }
    }

    if !must.job_titles.is_empty() {
        let wanted: Vec<String> = must
            .job_titles
            .iter()
            .map(|t| natural_key(NodeLabel::JobTitle, t))
            .collect();
        let any = links.iter().any(|link| {
            link.edge.rel_type == RelType::HasTitle && wanted.contains(&link.feature_name)
        });
        if !any {
            return false;
        }
    }

    if !must.location_any.is_empty()
        && !must.location_any.iter().any(|entry| location_matches(entry, node))
    {
        return false;
    }

    if let Some(salary_max) = must.salary_max {
        // No stated expectation counts as not satisfying the ceiling.
        let expectation = node.attrs.get("salary_min").and_then(serde_json::Value::as_f64);
        match expectation {
            Some(expected) if expected <= salary_max => {}
            _ => return false,
        }
    }

    true
}

fn score_candidate(
    nice: &NiceToHave,
    node: &NodeRecord,
    links: &[FeatureLink],
    related: Option<&(&crate::matching::criteria::RelatedToClause, HashMap<String, f64>)>,
) -> (f64, Vec<ClauseContribution>) {
    let mut score = 0.0;
    let mut contributions = Vec::new();
    let mut add = |clause: String, contribution: f64| {
        score += contribution;
        contributions.push(ClauseContribution {
            clause,
            contribution,
        });
    };

    for clause in &nice.skills {
        if let Some(link) = skill_clause_satisfied(clause, links) {
            let edge_weight = link.edge.weight.unwrap_or(LOWEST_BASE);
            add(format!("skill:{}", clause.name), clause.weight * edge_weight);
        }
    }
    for clause in &nice.languages {
        if let Some(link) = language_clause_satisfied(clause, links) {
            let edge_weight = link.edge.weight.unwrap_or(LOWEST_BASE);
            add(
                format!("language:{}", clause.name),
                clause.weight * edge_weight,
            );
        }
    }
    for clause in &nice.job_titles {
        if let Some(link) = find_link(links, RelType::HasTitle, NodeLabel::JobTitle, &clause.name) {
            let edge_weight = link.edge.weight.unwrap_or(LOWEST_BASE);
            add(
                format!("job_title:{}", clause.name),
                clause.weight * edge_weight,
            );
        }
    }
    for clause in &nice.locations {
        // Plain string preference: fixed bonus, no graph weight involved.
        if location_matches(&clause.name, node) {
            add(format!("location:{}", clause.name), clause.weight);
        }
    }
    if let Some((clause, costs)) = related {
        let proximity = if node.uid == clause.candidate_uid {
            Some(1.0)
        } else {
            costs.get(&node.uid).map(|cost| 1.0 / (1.0 + cost))
        };
        if let Some(proximity) = proximity {
            add(
                format!("related_to:{}", clause.candidate_uid),
                clause.weight * proximity,
            );
        }
    }

    (score, contributions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AttrMap;
    use crate::store::{GraphStore, MemoryGraphStore};
    use crate::weighting::{GraphEpoch, WeightingService};
    use serde_json::json;

    fn attrs(value: serde_json::Value) -> AttrMap {
        value.as_object().cloned().unwrap_or_default()
    }

    struct Fixture {
        store: Arc<MemoryGraphStore>,
        engine: RecommendationEngine,
        weighting: WeightingService,
        projections: Arc<ProjectionManager>,
    }

    fn fixture() -> Fixture {
        let store: Arc<MemoryGraphStore> = Arc::new(MemoryGraphStore::new());
        let shared: SharedStore = store.clone();
        let epoch = GraphEpoch::new();
        let projections = Arc::new(ProjectionManager::new(shared.clone(), epoch.clone()));
        Fixture {
            store,
            engine: RecommendationEngine::new(shared.clone(), projections.clone()),
            weighting: WeightingService::new(shared, epoch),
            projections,
        }
    }

    async fn add_candidate(
        fx: &Fixture,
        name: &str,
        node_attrs: serde_json::Value,
        skills: &[(&str, &str)],
    ) -> String {
        let uid = fx
            .store
            .upsert_node(NodeLabel::Candidate, name, attrs(node_attrs))
            .await
            .unwrap();
        for (skill, level) in skills {
            let skill_uid = fx
                .store
                .upsert_node(NodeLabel::Skill, skill, attrs(json!({})))
                .await
                .unwrap();
            fx.store
                .upsert_edge(
                    &uid,
                    RelType::HasSkill,
                    &skill_uid,
                    attrs(json!({"level": level})),
                )
                .await
                .unwrap();
        }
        fx.weighting
            .recalc_for_candidate(&uid, chrono::Utc::now())
            .await
            .unwrap();
        uid
    }

    fn must_skill(name: &str, min_level: &str) -> serde_json::Value {
        json!({"name": name, "min_level": min_level})
    }

    #[tokio::test]
    async fn must_have_skill_level_is_a_floor() {
        let fx = fixture();
        let x = add_candidate(
            &fx,
            "x",
            json!({"name": "X"}),
            &[("python", "expert"), ("sql", "intermediate")],
        )
        .await;

        let passes: SearchCriteria = serde_json::from_value(json!({
            "must_have": {"skills": [must_skill("python", "advanced")]}
        }))
        .unwrap();
        let hits = fx.engine.search(&passes, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].uid, x);

        let excludes: SearchCriteria = serde_json::from_value(json!({
            "must_have": {"skills": [
                must_skill("python", "expert"),
                must_skill("rust", "beginner")
            ]}
        }))
        .unwrap();
        assert!(fx.engine.search(&excludes, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn skill_aliases_match_the_canonical_node() {
        let fx = fixture();
        add_candidate(&fx, "y", json!({}), &[("javascript", "advanced")]).await;

        let criteria: SearchCriteria = serde_json::from_value(json!({
            "must_have": {"skills": [{"name": "js"}]}
        }))
        .unwrap();
        assert_eq!(fx.engine.search(&criteria, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn salary_ceiling_excludes_missing_expectations() {
        let fx = fixture();
        add_candidate(&fx, "cheap", json!({"salary_min": 70000.0}), &[]).await;
        add_candidate(&fx, "pricey", json!({"salary_min": 150000.0}), &[]).await;
        add_candidate(&fx, "silent", json!({}), &[]).await;

        let criteria: SearchCriteria = serde_json::from_value(json!({
            "must_have": {"salary_max": 100000.0}
        }))
        .unwrap();
        let hits = fx.engine.search(&criteria, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "cheap");
    }

    #[tokio::test]
    async fn remote_entry_matches_remote_ok_candidates() {
        let fx = fixture();
        add_candidate(&fx, "berliner", json!({"location": "Berlin"}), &[]).await;
        add_candidate(&fx, "nomad", json!({"remote_ok": true}), &[]).await;
        add_candidate(&fx, "parisian", json!({"location": "Paris"}), &[]).await;

        let criteria: SearchCriteria = serde_json::from_value(json!({
            "must_have": {"location_any": ["berlin", "remote"]}
        }))
        .unwrap();
        let hits = fx.engine.search(&criteria, None).await.unwrap();
        let names: Vec<&str> = hits.iter().map(|n| n.name.as_str()).collect();
        assert!(names.contains(&"berliner"));
        assert!(names.contains(&"nomad"));
        assert!(!names.contains(&"parisian"));
    }

    #[tokio::test]
    async fn match_ranks_by_nice_to_have_weight() {
        let fx = fixture();
        let strong = add_candidate(&fx, "strong", json!({}), &[("rust", "expert")]).await;
        let weak = add_candidate(&fx, "weak", json!({}), &[("rust", "beginner")]).await;

        let criteria: MatchCriteria = serde_json::from_value(json!({
            "nice_to_have": {"skills": [{"name": "rust", "weight": 1.0}]},
            "top_k": 10,
            "explain": true
        }))
        .unwrap();
        let results = fx.engine.match_candidates(&criteria, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].candidate_uid, strong);
        assert_eq!(results[1].candidate_uid, weak);
        assert!(results[0].score > results[1].score);

        let explain = results[0].explain.as_ref().unwrap();
        assert_eq!(explain.len(), 1);
        assert_eq!(explain[0].clause, "skill:rust");
        assert!(explain[0].contribution > 0.0);
    }

    #[tokio::test]
    async fn top_k_is_a_prefix_of_the_larger_ranking() {
        let fx = fixture();
        for (name, level) in [
            ("a", "beginner"),
            ("b", "intermediate"),
            ("c", "advanced"),
            ("d", "expert"),
        ] {
            add_candidate(&fx, name, json!({}), &[("go", level)]).await;
        }

        let small: MatchCriteria = serde_json::from_value(json!({
            "nice_to_have": {"skills": [{"name": "go"}]},
            "top_k": 2
        }))
        .unwrap();
        let large: MatchCriteria = serde_json::from_value(json!({
            "nice_to_have": {"skills": [{"name": "go"}]},
            "top_k": 4
        }))
        .unwrap();

        let top2 = fx.engine.match_candidates(&small, None).await.unwrap();
        let top4 = fx.engine.match_candidates(&large, None).await.unwrap();
        assert_eq!(top2.len(), 2);
        assert_eq!(top4.len(), 4);
        for (a, b) in top2.iter().zip(top4.iter()) {
            assert_eq!(a.candidate_uid, b.candidate_uid);
        }
    }

    #[tokio::test]
    async fn normalized_scores_stay_within_unit_range() {
        let fx = fixture();
        add_candidate(&fx, "ada", json!({"location": "Berlin"}), &[("rust", "expert")]).await;

        let criteria: MatchCriteria = serde_json::from_value(json!({
            "nice_to_have": {
                "skills": [{"name": "rust", "weight": 3.0}],
                "locations": [{"name": "berlin", "weight": 1.0}]
            },
            "normalize": true
        }))
        .unwrap();
        let results = fx.engine.match_candidates(&criteria, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].score > 0.0 && results[0].score <= 1.0);
    }

    #[tokio::test]
    async fn related_candidates_rank_by_shared_feature_strength() {
        let fx = fixture();
        let anchor = add_candidate(&fx, "anchor", json!({}), &[("rust", "expert")]).await;
        let close = add_candidate(&fx, "close", json!({}), &[("rust", "expert")]).await;
        let far = add_candidate(&fx, "far", json!({}), &[("rust", "beginner")]).await;
        add_candidate(&fx, "stranger", json!({}), &[("cobol", "expert")]).await;

        let related = fx
            .engine
            .related_candidates(&anchor, 10, 2, "candidate-skill", None)
            .await
            .unwrap();
        assert_eq!(related.len(), 2);
        assert_eq!(related[0].candidate_uid, close);
        assert_eq!(related[1].candidate_uid, far);
        assert!(related[0].cost < related[1].cost);
    }

    #[tokio::test]
    async fn unknown_anchor_is_not_found() {
        let fx = fixture();
        let err = fx
            .engine
            .related_candidates("missing", 5, 2, "candidate-skill", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn shortest_path_between_disconnected_candidates_is_none() {
        let fx = fixture();
        let a = add_candidate(&fx, "a", json!({}), &[("rust", "expert")]).await;
        let b = add_candidate(&fx, "b", json!({}), &[("cobol", "expert")]).await;

        let path = fx
            .engine
            .shortest_path(&a, &b, 2, "candidate-skill", None)
            .await
            .unwrap();
        assert!(path.is_none());
    }

    #[tokio::test]
    async fn stale_handles_keep_old_costs_until_refreshed() {
        let fx = fixture();
        let anchor = add_candidate(&fx, "anchor", json!({}), &[("rust", "expert")]).await;
        let other = add_candidate(&fx, "other", json!({}), &[("rust", "expert")]).await;

        // Two expert edges (weight 0.9 each): path cost 0.1 + 0.1.
        let before = fx
            .engine
            .shortest_path(&anchor, &other, 2, "candidate-skill", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(before.hops, 2);
        assert!((before.cost - 0.2).abs() < 1e-9);

        let stale = fx.projections.get("candidate-skill").await.unwrap();

        // Downgrade one edge and recompute; the epoch bump marks the cached
        // projection stale.
        let skill = fx
            .store
            .find_node_by_name(NodeLabel::Skill, "rust")
            .await
            .unwrap()
            .unwrap();
        fx.store
            .upsert_edge(
                &other,
                RelType::HasSkill,
                &skill.uid,
                attrs(json!({"level": "beginner"})),
            )
            .await
            .unwrap();
        let outcome = fx
            .weighting
            .recalc_for_candidate(&other, chrono::Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome.updated, 1);

        // The handle taken before the recompute still answers with the old
        // cost.
        let held = paths::shortest_path(&stale, &anchor, &other, 2).unwrap();
        assert!((held.cost - before.cost).abs() < 1e-9);

        // A fresh query rebuilds and sees the weaker edge: 0.1 + 0.7.
        let after = fx
            .engine
            .shortest_path(&anchor, &other, 2, "candidate-skill", None)
            .await
            .unwrap()
            .unwrap();
        assert!((after.cost - 0.8).abs() < 1e-9);
        assert!(after.cost > before.cost);
    }
}
