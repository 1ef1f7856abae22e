//! Core of the candidate-graph recommendation engine: the property-graph
//! model, the pure weight model, the weighting service, in-process
//! projections, and the filter/score/path matching engine.
//!
//! The API crate wires these against a concrete store; everything here works
//! against the [`store::GraphStore`] trait.

pub mod candidates;
pub mod error;
pub mod graph;
pub mod logging;
pub mod matching;
pub mod normalize;
pub mod projection;
pub mod run_id;
pub mod store;
pub mod weight;
pub mod weighting;

pub use error::EngineError;
