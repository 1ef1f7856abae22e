//! Pure weight model: maps the qualitative attributes stored on
//! candidate→feature edges to a derived weight in `[0, 1]`.
//!
//! Nothing here touches the store. Recomputing with the same attributes and
//! the same `as_of` instant always yields the same value, which is what makes
//! the weighting service idempotent.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::graph::{AttrMap, RelType};

/// Ordinal skill mastery. Criteria deserialization is strict; stored edge
/// attributes are parsed leniently with [`skill_base_score`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl SkillLevel {
    pub fn level_num(&self) -> i64 {
        match self {
            SkillLevel::Beginner => 1,
            SkillLevel::Intermediate => 2,
            SkillLevel::Advanced => 3,
            SkillLevel::Expert => 4,
        }
    }
}

/// CEFR-style language proficiency plus `native`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum LangLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
    #[serde(rename = "native")]
    #[strum(serialize = "native")]
    Native,
}

impl LangLevel {
    pub fn level_num(&self) -> i64 {
        match self {
            LangLevel::A1 => 1,
            LangLevel::A2 => 2,
            LangLevel::B1 => 3,
            LangLevel::B2 => 4,
            LangLevel::C1 => 5,
            LangLevel::C2 => 6,
            LangLevel::Native => 7,
        }
    }
}

/// Lowest base score, used as the documented default for unknown categories
/// so a single odd value never aborts a bulk recompute.
pub const LOWEST_BASE: f64 = 0.3;

/// Mastery → base score. Includes the spelling variants seen in parsed
/// resumes; anything unrecognized falls back to [`LOWEST_BASE`].
pub fn skill_base_score(level: Option<&str>) -> f64 {
    let Some(level) = level else {
        return LOWEST_BASE;
    };
    match level.trim().to_lowercase().as_str() {
        "beginner" | "basic" | "basics" => 0.3,
        "intermediate" => 0.6,
        "advanced" => 0.75,
        "expert" => 0.9,
        _ => LOWEST_BASE,
    }
}

pub fn language_base_score(level: Option<&str>) -> f64 {
    let Some(level) = level else {
        return 0.15;
    };
    match level.trim().to_uppercase().as_str() {
        "A1" => 0.15,
        "A2" => 0.3,
        "B1" => 0.45,
        "B2" => 0.6,
        "C1" => 0.75,
        "C2" => 0.9,
        "NATIVE" => 1.0,
        _ => 0.15,
    }
}

/// Lenient ordinal for filter comparisons on stored attributes. Unknown
/// levels rank lowest rather than failing.
pub fn skill_level_num(level: Option<&str>) -> i64 {
    level
        .and_then(|raw| raw.trim().to_lowercase().parse::<SkillLevel>().ok())
        .map(|l| l.level_num())
        .unwrap_or(1)
}

pub fn language_level_num(level: Option<&str>) -> i64 {
    level
        .and_then(|raw| raw.trim().parse::<LangLevel>().ok())
        .map(|l| l.level_num())
        .unwrap_or(1)
}

fn degree_base_score(degree: Option<&str>) -> f64 {
    let Some(degree) = degree else {
        return LOWEST_BASE;
    };
    match degree.trim().to_lowercase().as_str() {
        "high_school" => 0.3,
        "diploma" | "associate" => 0.4,
        "bachelor" => 0.6,
        "bachelor_honours" => 0.65,
        "master" | "professional_master" | "mphil" => 0.8,
        "phd" | "professional_doctorate" => 1.0,
        _ => LOWEST_BASE,
    }
}

fn impact_base_score(impact: Option<&str>) -> f64 {
    let Some(impact) = impact else {
        return LOWEST_BASE;
    };
    match impact.trim().to_lowercase().as_str() {
        "low" => 0.3,
        "medium" => 0.6,
        "high" => 0.9,
        _ => LOWEST_BASE,
    }
}

/// Linear time-decay configuration. Tunable through `CG_WEIGHT_DECAY_PER_YEAR`
/// and `CG_WEIGHT_DECAY_FLOOR`, in the same spirit as the other `CG_*` knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayConfig {
    pub per_year: f64,
    pub floor: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            per_year: env_f64("CG_WEIGHT_DECAY_PER_YEAR", 0.05),
            floor: env_f64("CG_WEIGHT_DECAY_FLOOR", 0.25),
        }
    }
}

fn env_f64(var: &str, default: f64) -> f64 {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Decay factor in `(0, 1]`: 1.0 at zero years, linear down to the floor.
pub fn decay_factor(years_since: f64, config: &DecayConfig) -> f64 {
    let years = years_since.max(0.0);
    (1.0 - config.per_year * years).clamp(config.floor.max(f64::EPSILON), 1.0)
}

/// Best-effort date parsing for `last_used` / `until` style attributes:
/// accepts `YYYY-MM-DD` or a bare year.
fn parse_attr_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    trimmed
        .parse::<i32>()
        .ok()
        .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
}

fn years_between(date: NaiveDate, as_of: DateTime<Utc>) -> f64 {
    let days = (as_of.date_naive() - date).num_days();
    days.max(0) as f64 / 365.25
}

fn recency_decay(attrs: &AttrMap, keys: &[&str], as_of: DateTime<Utc>, config: &DecayConfig) -> f64 {
    for key in keys {
        let parsed = attrs
            .get(*key)
            .and_then(|v| match v {
                serde_json::Value::String(s) => parse_attr_date(s),
                serde_json::Value::Number(n) => n
                    .as_i64()
                    .and_then(|year| NaiveDate::from_ymd_opt(year as i32, 1, 1)),
                _ => None,
            });
        if let Some(date) = parsed {
            return decay_factor(years_between(date, as_of), config);
        }
    }
    // No recency information means no decay.
    1.0
}

fn attr_str<'a>(attrs: &'a AttrMap, key: &str) -> Option<&'a str> {
    attrs.get(key).and_then(serde_json::Value::as_str)
}

fn title_tenure_base(attrs: &AttrMap, as_of: DateTime<Utc>) -> f64 {
    let since = attr_str(attrs, "since").and_then(parse_attr_date);
    let until = attr_str(attrs, "until")
        .and_then(parse_attr_date)
        .unwrap_or_else(|| as_of.date_naive());

    match since {
        Some(since) if until >= since => {
            let tenure_years = (until - since).num_days() as f64 / 365.25;
            (LOWEST_BASE + tenure_years / 10.0 * (1.0 - LOWEST_BASE)).min(1.0)
        }
        _ => LOWEST_BASE,
    }
}

fn education_base(attrs: &AttrMap) -> f64 {
    let degree = degree_base_score(attr_str(attrs, "degree"));
    match attrs.get("gpa").and_then(serde_json::Value::as_f64) {
        Some(gpa) => 0.6 * degree + 0.4 * (gpa / 4.0).clamp(0.0, 1.0),
        None => degree,
    }
}

fn graduation_base(attrs: &AttrMap, as_of: DateTime<Utc>) -> f64 {
    // Graduation links contribute a flat base; the year only drives decay,
    // handled by the caller through `recency_decay`.
    let _ = (attrs, as_of);
    0.5
}

/// Derive the weight for one edge from its qualitative attributes.
///
/// Returns `None` for structural feature→feature edges, which never carry a
/// weight. Never fails: unknown categories map to the lowest base score.
pub fn derive_edge_weight(
    rel_type: RelType,
    attrs: &AttrMap,
    as_of: DateTime<Utc>,
    config: &DecayConfig,
) -> Option<f64> {
    if !rel_type.is_weighted() {
        return None;
    }

    let base = match rel_type {
        RelType::HasSkill => skill_base_score(attr_str(attrs, "level")),
        RelType::Speaks => language_base_score(attr_str(attrs, "level")),
        RelType::HasTitle => title_tenure_base(attrs, as_of),
        RelType::MajoredIn => education_base(attrs),
        RelType::GraduatedFrom => graduation_base(attrs, as_of),
        RelType::WorkedOn => impact_base_score(attr_str(attrs, "impact")),
        RelType::UsedSkill | RelType::CorrelatesWith => unreachable!(),
    };

    let decay = match rel_type {
        RelType::HasSkill => recency_decay(attrs, &["last_used"], as_of, config),
        RelType::WorkedOn | RelType::HasTitle => recency_decay(attrs, &["until"], as_of, config),
        RelType::GraduatedFrom => recency_decay(attrs, &["year"], as_of, config),
        _ => 1.0,
    };

    Some((base * decay).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
    }

    fn no_decay() -> DecayConfig {
        DecayConfig {
            per_year: 0.05,
            floor: 0.25,
        }
    }

    fn attrs(value: serde_json::Value) -> AttrMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn mastery_levels_are_monotone() {
        let levels = ["beginner", "intermediate", "advanced", "expert"];
        let scores: Vec<f64> = levels
            .iter()
            .map(|l| skill_base_score(Some(l)))
            .collect();
        assert!(scores.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(scores[0], LOWEST_BASE);
    }

    #[test]
    fn unknown_category_defaults_to_lowest_base() {
        assert_eq!(skill_base_score(Some("wizard")), LOWEST_BASE);
        assert_eq!(skill_base_score(None), LOWEST_BASE);
        assert_eq!(language_base_score(Some("Z9")), 0.15);
        assert_eq!(impact_base_score(Some("galactic")), LOWEST_BASE);
    }

    #[test]
    fn derive_is_deterministic_for_fixed_as_of() {
        let attrs = attrs(json!({"level": "expert", "last_used": "2024-01-15"}));
        let first = derive_edge_weight(RelType::HasSkill, &attrs, fixed_now(), &no_decay());
        let second = derive_edge_weight(RelType::HasSkill, &attrs, fixed_now(), &no_decay());
        assert_eq!(first, second);
        assert!(first.unwrap() > 0.0 && first.unwrap() <= 1.0);
    }

    #[test]
    fn older_usage_never_outweighs_newer() {
        let newer = attrs(json!({"level": "expert", "last_used": "2025-06-01"}));
        let older = attrs(json!({"level": "expert", "last_used": "2018-06-01"}));
        let config = no_decay();

        let w_new = derive_edge_weight(RelType::HasSkill, &newer, fixed_now(), &config).unwrap();
        let w_old = derive_edge_weight(RelType::HasSkill, &older, fixed_now(), &config).unwrap();
        assert!(w_old <= w_new);
    }

    #[test]
    fn decay_is_clamped_to_the_floor() {
        let config = no_decay();
        assert_eq!(decay_factor(0.0, &config), 1.0);
        assert_eq!(decay_factor(100.0, &config), config.floor);
        assert!(decay_factor(3.0, &config) < 1.0);
    }

    #[test]
    fn structural_edges_never_get_a_weight() {
        let empty = AttrMap::new();
        assert_eq!(
            derive_edge_weight(RelType::UsedSkill, &empty, fixed_now(), &no_decay()),
            None
        );
    }

    #[test]
    fn education_blends_degree_and_gpa() {
        let with_gpa = attrs(json!({"degree": "bachelor", "gpa": 4.0}));
        let without_gpa = attrs(json!({"degree": "bachelor"}));
        let config = no_decay();

        let blended =
            derive_edge_weight(RelType::MajoredIn, &with_gpa, fixed_now(), &config).unwrap();
        let plain =
            derive_edge_weight(RelType::MajoredIn, &without_gpa, fixed_now(), &config).unwrap();
        assert!(blended > plain);
    }

    #[test]
    fn title_tenure_grows_with_duration() {
        let long = attrs(json!({"since": "2016-01-01", "until": "2025-01-01"}));
        let short = attrs(json!({"since": "2024-01-01", "until": "2025-01-01"}));
        let config = no_decay();

        let w_long = derive_edge_weight(RelType::HasTitle, &long, fixed_now(), &config).unwrap();
        let w_short = derive_edge_weight(RelType::HasTitle, &short, fixed_now(), &config).unwrap();
        assert!(w_long > w_short);
    }

    #[test]
    fn criteria_levels_parse_strictly() {
        assert_eq!("expert".parse::<SkillLevel>().unwrap(), SkillLevel::Expert);
        assert!("wizard".parse::<SkillLevel>().is_err());
        assert_eq!("B2".parse::<LangLevel>().unwrap().level_num(), 4);
        assert!(SkillLevel::Advanced > SkillLevel::Intermediate);
    }
}
