//! Candidate ingestion and profile reads.
//!
//! Ingestion consumes the structured JSON produced by the external resume
//! parser, merges it into the graph (nodes by normalized natural key, edges
//! by their `(from, rel, to)` triple) and recomputes the candidate's edge
//! weights in the same call, so a freshly ingested candidate is immediately
//! rankable.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::error::EngineError;
use crate::graph::{AttrMap, FeatureLink, NodeLabel, NodeRecord, RelType};
use crate::store::SharedStore;
use crate::weighting::WeightingService;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResumeSkill {
    pub name: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub years: Option<f64>,
    #[serde(default)]
    pub last_used: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResumeLanguage {
    pub name: String,
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResumeTitle {
    pub name: String,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub until: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResumeEducation {
    pub major: String,
    #[serde(default)]
    pub university: Option<String>,
    #[serde(default)]
    pub degree: Option<String>,
    #[serde(default)]
    pub gpa: Option<f64>,
    #[serde(default)]
    pub graduation_year: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResumeProject {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub until: Option<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
}

/// Structured resume as delivered by the upstream parser. Unknown fields are
/// tolerated; the parser evolves independently of this engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResumePayload {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub remote_ok: Option<bool>,
    #[serde(default)]
    pub salary_min: Option<f64>,
    #[serde(default)]
    pub salary_currency: Option<String>,
    #[serde(default)]
    pub experience_years: Option<f64>,
    #[serde(default)]
    pub skills: Vec<ResumeSkill>,
    #[serde(default)]
    pub languages: Vec<ResumeLanguage>,
    #[serde(default)]
    pub job_titles: Vec<ResumeTitle>,
    #[serde(default)]
    pub education: Vec<ResumeEducation>,
    #[serde(default)]
    pub projects: Vec<ResumeProject>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub candidate_uid: String,
    pub features_linked: usize,
    pub weights_updated: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateProfile {
    pub candidate: NodeRecord,
    pub features: Vec<FeatureLink>,
}

fn attr_entry(map: &mut AttrMap, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        if !value.is_null() {
            map.insert(key.to_string(), value);
        }
    }
}

fn opt_str(value: &Option<String>) -> Option<Value> {
    value.as_deref().map(|s| json!(s))
}

pub struct CandidateService {
    store: SharedStore,
    weighting: Arc<WeightingService>,
}

impl CandidateService {
    pub fn new(store: SharedStore, weighting: Arc<WeightingService>) -> Self {
        Self { store, weighting }
    }

    /// Merge a parsed resume into the graph and recompute the candidate's
    /// weights. Re-ingesting the same person updates the existing nodes and
    /// edges instead of duplicating them.
    #[instrument(skip(self, payload), fields(candidate = %payload.name))]
    pub async fn ingest(&self, payload: &ResumePayload) -> Result<IngestOutcome, EngineError> {
        if payload.name.trim().is_empty() {
            return Err(EngineError::Validation(
                "candidate name must be non-empty".to_string(),
            ));
        }

        let mut attrs = AttrMap::new();
        attrs.insert("name".to_string(), json!(payload.name.trim()));
        attr_entry(&mut attrs, "location", opt_str(&payload.location));
        attr_entry(&mut attrs, "remote_ok", payload.remote_ok.map(|v| json!(v)));
        attr_entry(&mut attrs, "salary_min", payload.salary_min.map(|v| json!(v)));
        attr_entry(&mut attrs, "salary_currency", opt_str(&payload.salary_currency));
        attr_entry(
            &mut attrs,
            "experience_years",
            payload.experience_years.map(|v| json!(v)),
        );

        let uid = self
            .store
            .upsert_node(NodeLabel::Candidate, &payload.name, attrs)
            .await?;

        let mut linked = 0usize;

        for skill in &payload.skills {
            if skill.name.trim().is_empty() {
                continue;
            }
            let skill_uid = self
                .store
                .upsert_node(NodeLabel::Skill, &skill.name, AttrMap::new())
                .await?;
            let mut edge_attrs = AttrMap::new();
            attr_entry(&mut edge_attrs, "level", opt_str(&skill.level));
            attr_entry(&mut edge_attrs, "years", skill.years.map(|v| json!(v)));
            attr_entry(&mut edge_attrs, "last_used", opt_str(&skill.last_used));
            self.store
                .upsert_edge(&uid, RelType::HasSkill, &skill_uid, edge_attrs)
                .await?;
            linked += 1;
        }

        for language in &payload.languages {
            if language.name.trim().is_empty() {
                continue;
            }
            let lang_uid = self
                .store
                .upsert_node(NodeLabel::Language, &language.name, AttrMap::new())
                .await?;
            let mut edge_attrs = AttrMap::new();
            attr_entry(&mut edge_attrs, "level", opt_str(&language.level));
            self.store
                .upsert_edge(&uid, RelType::Speaks, &lang_uid, edge_attrs)
                .await?;
            linked += 1;
        }

        for title in &payload.job_titles {
            if title.name.trim().is_empty() {
                continue;
            }
            let title_uid = self
                .store
                .upsert_node(NodeLabel::JobTitle, &title.name, AttrMap::new())
                .await?;
            let mut edge_attrs = AttrMap::new();
            attr_entry(&mut edge_attrs, "since", opt_str(&title.since));
            attr_entry(&mut edge_attrs, "until", opt_str(&title.until));
            self.store
                .upsert_edge(&uid, RelType::HasTitle, &title_uid, edge_attrs)
                .await?;
            linked += 1;
        }

        for education in &payload.education {
            if education.major.trim().is_empty() {
                continue;
            }
            let major_uid = self
                .store
                .upsert_node(NodeLabel::Major, &education.major, AttrMap::new())
                .await?;
            let mut edge_attrs = AttrMap::new();
            attr_entry(&mut edge_attrs, "degree", opt_str(&education.degree));
            attr_entry(&mut edge_attrs, "gpa", education.gpa.map(|v| json!(v)));
            self.store
                .upsert_edge(&uid, RelType::MajoredIn, &major_uid, edge_attrs)
                .await?;
            linked += 1;

            if let Some(university) = &education.university {
                if !university.trim().is_empty() {
                    let uni_uid = self
                        .store
                        .upsert_node(NodeLabel::University, university, AttrMap::new())
                        .await?;
                    let mut edge_attrs = AttrMap::new();
                    attr_entry(
                        &mut edge_attrs,
                        "year",
                        education.graduation_year.map(|v| json!(v)),
                    );
                    self.store
                        .upsert_edge(&uid, RelType::GraduatedFrom, &uni_uid, edge_attrs)
                        .await?;
                    linked += 1;
                }
            }
        }

        for project in &payload.projects {
            if project.name.trim().is_empty() {
                continue;
            }
            let project_uid = self
                .store
                .upsert_node(NodeLabel::Project, &project.name, AttrMap::new())
                .await?;
            let mut edge_attrs = AttrMap::new();
            attr_entry(&mut edge_attrs, "role", opt_str(&project.role));
            attr_entry(&mut edge_attrs, "impact", opt_str(&project.impact));
            attr_entry(&mut edge_attrs, "until", opt_str(&project.until));
            self.store
                .upsert_edge(&uid, RelType::WorkedOn, &project_uid, edge_attrs)
                .await?;
            linked += 1;

            // Structural project→skill links; no weight, traversal only.
            for tech in &project.tech_stack {
                if tech.trim().is_empty() {
                    continue;
                }
                let skill_uid = self
                    .store
                    .upsert_node(NodeLabel::Skill, tech, AttrMap::new())
                    .await?;
                self.store
                    .upsert_edge(&project_uid, RelType::UsedSkill, &skill_uid, AttrMap::new())
                    .await?;
            }
        }

        let outcome = self
            .weighting
            .recalc_for_candidate(&uid, chrono::Utc::now())
            .await?;

        info!(
            candidate_uid = uid,
            features_linked = linked,
            weights_updated = outcome.updated,
            "candidate ingested"
        );

        Ok(IngestOutcome {
            candidate_uid: uid,
            features_linked: linked,
            weights_updated: outcome.updated,
        })
    }

    /// Candidate node plus all its feature links, or `NotFound`.
    pub async fn profile(&self, uid: &str) -> Result<CandidateProfile, EngineError> {
        let candidate = self
            .store
            .get_node(NodeLabel::Candidate, uid)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("candidate {uid}")))?;
        let features = self.store.candidate_features(uid).await?;
        Ok(CandidateProfile {
            candidate,
            features,
        })
    }
}
