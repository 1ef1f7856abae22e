use once_cell::sync::Lazy;
use regex::Regex;

use crate::graph::NodeLabel;

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Canonical spelling variants mapped onto one dictionary entry, so that
/// "JS", "js " and "javascript" all resolve to the same Skill node.
static SKILL_ALIASES: &[(&str, &str)] = &[
    ("js", "javascript"),
    ("ts", "typescript"),
    ("k8s", "kubernetes"),
    ("postgres", "postgresql"),
    ("py", "python"),
    ("golang", "go"),
    ("node", "node.js"),
    ("nodejs", "node.js"),
    ("react.js", "react"),
    ("reactjs", "react"),
];

/// Lowercase, trim and collapse internal whitespace.
///
/// Contract: returns an empty string only for inputs that contain no
/// non-whitespace characters; callers treat an empty result as "no value".
pub fn normalize_name(raw: &str) -> String {
    let trimmed = raw.trim().to_lowercase();
    RE_WHITESPACE.replace_all(&trimmed, " ").into_owned()
}

pub fn normalize_skill(raw: &str) -> String {
    let normalized = normalize_name(raw);
    SKILL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or(normalized)
}

/// Natural-key normalization per node label. Skills get alias folding on
/// top of the plain normalization; everything else is name-normalized only.
pub fn natural_key(label: NodeLabel, raw: &str) -> String {
    match label {
        NodeLabel::Skill => normalize_skill(raw),
        _ => normalize_name(raw),
    }
}
