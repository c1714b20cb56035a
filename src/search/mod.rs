//! Fuzzy search over metric definitions
//!
//! `fuzzy` scores one field value, `ranking` folds field scores into a metric
//! score, and `engine` owns the snapshot and index.

pub mod engine;
pub mod fuzzy;
pub mod ranking;

pub use engine::{FieldMatch, MetricsIndex, SearchResult};
pub use fuzzy::{FuzzyMatch, FuzzyMatcher};
pub use ranking::{FieldWeights, SearchKey};
