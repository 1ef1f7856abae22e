pub mod candidates;
pub mod health;
pub mod matching;
pub mod projections;
pub mod weights;
