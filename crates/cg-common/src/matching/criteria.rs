//! Structured query shapes for `search` and `match`.
//!
//! Deserialization is strict (`deny_unknown_fields`), so a typo in a clause
//! name fails as a validation error before any graph access rather than
//! silently matching nothing.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::weight::{LangLevel, SkillLevel};

fn default_clause_weight() -> f64 {
    1.0
}

/// Skill requirement or preference. `min_level` compares against the stored
/// mastery on the HAS_SKILL edge; `min_years` only applies where the edge
/// tracks years.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkillClause {
    pub name: String,
    #[serde(default)]
    pub min_level: Option<SkillLevel>,
    #[serde(default)]
    pub min_years: Option<f64>,
    #[serde(default = "default_clause_weight")]
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LanguageClause {
    pub name: String,
    #[serde(default)]
    pub min_level: Option<LangLevel>,
    #[serde(default = "default_clause_weight")]
    pub weight: f64,
}

/// Plain string preference carrying only a clause weight (job titles,
/// locations).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedClause {
    pub name: String,
    #[serde(default = "default_clause_weight")]
    pub weight: f64,
}

/// Proximity preference: boost candidates close to an anchor candidate in
/// the projection, scaled by `1 / (1 + path_cost)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelatedToClause {
    pub candidate_uid: String,
    #[serde(default = "default_clause_weight")]
    pub weight: f64,
    #[serde(default = "RelatedToClause::default_max_hops")]
    pub max_hops: usize,
    #[serde(default = "RelatedToClause::default_projection")]
    pub projection: String,
}

impl RelatedToClause {
    fn default_max_hops() -> usize {
        4
    }

    fn default_projection() -> String {
        "candidate-feature-full".to_string()
    }
}

/// Hard requirements. Every present clause must be satisfied; an unmet clause
/// excludes the candidate entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MustHave {
    #[serde(default)]
    pub skills: Vec<SkillClause>,
    #[serde(default)]
    pub languages: Vec<LanguageClause>,
    /// Any-of match over the candidate's job titles.
    #[serde(default)]
    pub job_titles: Vec<String>,
    /// Any-of match over locations; the entry `"remote"` additionally matches
    /// candidates flagged remote-ok.
    #[serde(default)]
    pub location_any: Vec<String>,
    /// Upper bound on the candidate's salary expectation. Candidates without
    /// a stated expectation are excluded when this is set.
    #[serde(default)]
    pub salary_max: Option<f64>,
}

/// Soft preferences. Matched clauses add `clause_weight * edge_weight` (or a
/// fixed bonus where no graph weight applies); unmatched clauses add nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NiceToHave {
    #[serde(default)]
    pub skills: Vec<SkillClause>,
    #[serde(default)]
    pub languages: Vec<LanguageClause>,
    #[serde(default)]
    pub job_titles: Vec<NamedClause>,
    #[serde(default)]
    pub locations: Vec<NamedClause>,
    #[serde(default)]
    pub related_to: Option<RelatedToClause>,
}

impl NiceToHave {
    /// Maximum achievable score given the clause weights, used when
    /// normalizing so scores stay comparable across queries.
    pub fn max_score(&self) -> f64 {
        self.skills.iter().map(|c| c.weight).sum::<f64>()
            + self.languages.iter().map(|c| c.weight).sum::<f64>()
            + self.job_titles.iter().map(|c| c.weight).sum::<f64>()
            + self.locations.iter().map(|c| c.weight).sum::<f64>()
            + self.related_to.as_ref().map(|c| c.weight).unwrap_or(0.0)
    }
}

fn default_top_k() -> usize {
    10
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchCriteria {
    #[serde(default)]
    pub must_have: MustHave,
    #[serde(default)]
    pub nice_to_have: NiceToHave,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Attach per-candidate clause contributions to the result.
    #[serde(default)]
    pub explain: bool,
    /// Divide scores by the query's maximum achievable score.
    #[serde(default)]
    pub normalize: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchCriteria {
    #[serde(default)]
    pub must_have: MustHave,
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn check_weight(context: &str, weight: f64) -> Result<(), EngineError> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(EngineError::Validation(format!(
            "{context}: clause weight must be a non-negative number, got {weight}"
        )));
    }
    Ok(())
}

fn check_name(context: &str, name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::Validation(format!(
            "{context}: clause name must be non-empty"
        )));
    }
    Ok(())
}

impl MustHave {
    fn validate(&self) -> Result<(), EngineError> {
        for clause in &self.skills {
            check_name("must_have.skills", &clause.name)?;
            if let Some(years) = clause.min_years {
                if !years.is_finite() || years < 0.0 {
                    return Err(EngineError::Validation(format!(
                        "must_have.skills[{}]: min_years must be non-negative",
                        clause.name
                    )));
                }
            }
        }
        for clause in &self.languages {
            check_name("must_have.languages", &clause.name)?;
        }
        for title in &self.job_titles {
            check_name("must_have.job_titles", title)?;
        }
        for location in &self.location_any {
            check_name("must_have.location_any", location)?;
        }
        if let Some(salary) = self.salary_max {
            if !salary.is_finite() || salary <= 0.0 {
                return Err(EngineError::Validation(
                    "must_have.salary_max must be a positive number".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl NiceToHave {
    fn validate(&self) -> Result<(), EngineError> {
        for clause in &self.skills {
            check_name("nice_to_have.skills", &clause.name)?;
            check_weight("nice_to_have.skills", clause.weight)?;
        }
        for clause in &self.languages {
            check_name("nice_to_have.languages", &clause.name)?;
            check_weight("nice_to_have.languages", clause.weight)?;
        }
        for clause in &self.job_titles {
            check_name("nice_to_have.job_titles", &clause.name)?;
            check_weight("nice_to_have.job_titles", clause.weight)?;
        }
        for clause in &self.locations {
            check_name("nice_to_have.locations", &clause.name)?;
            check_weight("nice_to_have.locations", clause.weight)?;
        }
        if let Some(related) = &self.related_to {
            check_name("nice_to_have.related_to", &related.candidate_uid)?;
            check_weight("nice_to_have.related_to", related.weight)?;
            if related.max_hops == 0 {
                return Err(EngineError::Validation(
                    "nice_to_have.related_to.max_hops must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl MatchCriteria {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.top_k == 0 {
            return Err(EngineError::Validation(
                "top_k must be at least 1".to_string(),
            ));
        }
        self.must_have.validate()?;
        self.nice_to_have.validate()
    }
}

impl SearchCriteria {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.limit == 0 {
            return Err(EngineError::Validation(
                "limit must be at least 1".to_string(),
            ));
        }
        self.must_have.validate()
    }
}
