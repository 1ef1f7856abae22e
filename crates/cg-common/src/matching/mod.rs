//! Structured candidate matching: criteria shapes, the two-phase
//! filter/score engine, and path-based relatedness.

mod criteria;
mod engine;
mod paths;

pub use criteria::{
    LanguageClause, MatchCriteria, MustHave, NamedClause, NiceToHave, RelatedToClause,
    SearchCriteria, SkillClause,
};
pub use engine::{ClauseContribution, MatchResult, RecommendationEngine, RelatedCandidate};
pub use paths::{edge_cost, PathResult, DEFAULT_STRUCTURAL_COST};
