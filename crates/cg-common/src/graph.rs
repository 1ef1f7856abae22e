//! Node labels, relationship types and the generic node/edge records the
//! store adapters exchange. Attribute payloads stay as JSON maps so the
//! weight model can recompute derived weights from the stored qualitative
//! attributes at any time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

pub type AttrMap = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeLabel {
    Candidate,
    Skill,
    Language,
    JobTitle,
    Major,
    University,
    Project,
}

impl NodeLabel {
    /// Feature labels are the dictionary-like nodes deduplicated by
    /// normalized name and shared across candidates.
    pub fn is_feature(&self) -> bool {
        !matches!(self, NodeLabel::Candidate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RelType {
    #[serde(rename = "HAS_SKILL")]
    HasSkill,
    #[serde(rename = "SPEAKS")]
    Speaks,
    #[serde(rename = "HAS_TITLE")]
    HasTitle,
    #[serde(rename = "MAJORED_IN")]
    MajoredIn,
    #[serde(rename = "GRADUATED_FROM")]
    GraduatedFrom,
    #[serde(rename = "WORKED_ON")]
    WorkedOn,
    #[serde(rename = "USED_SKILL")]
    UsedSkill,
    #[serde(rename = "CORRELATES_WITH")]
    CorrelatesWith,
}

impl RelType {
    /// Candidate→feature edges carry a derived weight; feature→feature
    /// edges are structural and traversal-only.
    pub fn is_weighted(&self) -> bool {
        !matches!(self, RelType::UsedSkill | RelType::CorrelatesWith)
    }

    pub fn weighted() -> &'static [RelType] {
        &[
            RelType::HasSkill,
            RelType::Speaks,
            RelType::HasTitle,
            RelType::MajoredIn,
            RelType::GraduatedFrom,
            RelType::WorkedOn,
        ]
    }

    pub fn all() -> &'static [RelType] {
        &[
            RelType::HasSkill,
            RelType::Speaks,
            RelType::HasTitle,
            RelType::MajoredIn,
            RelType::GraduatedFrom,
            RelType::WorkedOn,
            RelType::UsedSkill,
            RelType::CorrelatesWith,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub uid: String,
    pub label: NodeLabel,
    /// Normalized natural key. For feature nodes this is the deduplication
    /// key; for candidates it is the normalized name.
    pub name: String,
    #[serde(default)]
    pub attrs: AttrMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub eid: String,
    pub from_uid: String,
    pub rel_type: RelType,
    pub to_uid: String,
    /// Qualitative attributes (level, years, gpa, impact, ...). The derived
    /// weight is never authoritative: it must equal the weight model applied
    /// to these attributes.
    #[serde(default)]
    pub attrs: AttrMap,
    pub weight: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

impl EdgeRecord {
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }

    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attrs.get(key).and_then(Value::as_f64)
    }
}

/// One candidate→feature link with the feature node resolved, as returned
/// by [`crate::store::GraphStore::candidate_features`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureLink {
    pub edge: EdgeRecord,
    pub feature_uid: String,
    pub feature_label: NodeLabel,
    pub feature_name: String,
}

/// Read-only dump of the node/edge types a projection build asked for.
#[derive(Debug, Clone, Default)]
pub struct SubgraphSnapshot {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rel_type_round_trips_through_strings() {
        assert_eq!(RelType::HasSkill.to_string(), "HAS_SKILL");
        assert_eq!("SPEAKS".parse::<RelType>().unwrap(), RelType::Speaks);
        assert_eq!(NodeLabel::JobTitle.to_string(), "job_title");
    }

    #[test]
    fn structural_edges_are_unweighted() {
        assert!(RelType::HasSkill.is_weighted());
        assert!(!RelType::UsedSkill.is_weighted());
        assert!(!RelType::CorrelatesWith.is_weighted());
        assert!(RelType::weighted().iter().all(RelType::is_weighted));
    }
}
