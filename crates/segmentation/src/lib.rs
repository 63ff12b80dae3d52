//! Segmentation conditions: operator registry and the default evaluator
//! used to branch funnels and gate order bumps.

pub mod engine;
pub mod predicates;

pub use engine::{MatchMode, SegmentEvaluator};
pub use predicates::ComparisonOperator;
