//! Funnel graphs and navigation: the validated node model, the storage
//! boundary, an in-memory funnel store, and the step and decision resolvers.

pub mod boundary;
pub mod evaluator;
pub mod resolver;
pub mod store;
pub mod types;

pub use evaluator::{Branch, DecisionEvaluator, DEFAULT_MAX_DECISION_HOPS};
pub use resolver::StepResolver;
pub use store::{FunnelStore, InMemoryFunnelStore};
pub use types::{
    BumpConfig, ConditionSet, FunnelGraph, FunnelNode, NextStep, NodeData, Optimization,
    ProductList,
};
