use std::collections::HashSet;
use std::sync::Arc;

use funnel_core::error::{FunnelError, FunnelResult, RecordKind};
use funnel_core::types::{FunnelId, NodeId, VisitorFacts};
use funnel_core::ConditionEvaluator;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::FunnelStore;
use crate::types::{ConditionSet, FunnelNode, NextStep};

pub const DEFAULT_MAX_DECISION_HOPS: usize = 64;

/// Which edge a decision node takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Yes,
    No,
}

/// Resolves decision nodes into the concrete step a visitor lands on.
#[derive(Clone)]
pub struct DecisionEvaluator {
    store: Arc<dyn FunnelStore>,
    conditions: Arc<dyn ConditionEvaluator>,
    max_hops: usize,
}

impl DecisionEvaluator {
    pub fn new(store: Arc<dyn FunnelStore>, conditions: Arc<dyn ConditionEvaluator>) -> Self {
        Self {
            store,
            conditions,
            max_hops: DEFAULT_MAX_DECISION_HOPS,
        }
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops.max(1);
        self
    }

    /// Evaluates a decision node's conditions. Malformed condition data or an
    /// evaluator failure takes the no-branch.
    pub fn branch(&self, node: &FunnelNode, facts: &VisitorFacts) -> Branch {
        match self.try_holds(&node.data.conditions, facts) {
            Ok(true) => Branch::Yes,
            Ok(false) => Branch::No,
            Err(reason) => {
                warn!(
                    funnel_id = node.funnel_id,
                    node_id = %node.id,
                    reason = %reason,
                    "Decision conditions could not be evaluated, taking no-branch"
                );
                Branch::No
            }
        }
    }

    /// Whether a condition set holds, counting unusable data as not met.
    pub fn holds(&self, conditions: &ConditionSet, facts: &VisitorFacts) -> bool {
        self.try_holds(conditions, facts).unwrap_or_else(|reason| {
            warn!(reason = %reason, "Conditions could not be evaluated, treating as not met");
            false
        })
    }

    fn try_holds(&self, conditions: &ConditionSet, facts: &VisitorFacts) -> Result<bool, String> {
        match conditions {
            ConditionSet::Valid(list) => self
                .conditions
                .evaluate(list, facts)
                .map_err(|e| e.to_string()),
            ConditionSet::Malformed(reason) => Err(format!("malformed conditions: {}", reason)),
        }
    }

    /// Follows decision edges from `node` until a non-decision step or the
    /// terminal is reached. A non-decision `node` resolves to itself.
    pub fn resolve(&self, node: &FunnelNode, facts: &VisitorFacts) -> FunnelResult<NextStep> {
        let mut current = node.clone();
        let mut visited: HashSet<NodeId> = HashSet::new();

        loop {
            if !current.is_decision() {
                return Ok(NextStep::Step(current));
            }
            if !visited.insert(current.id.clone()) || visited.len() > self.max_hops {
                return Err(FunnelError::Configuration(format!(
                    "decision chain in funnel {} revisits or exceeds {} hops at node {}",
                    current.funnel_id, self.max_hops, current.id
                )));
            }

            let branch = self.branch(&current, facts);
            let target = match branch {
                Branch::Yes => current.forward(),
                Branch::No => current.reject(),
            };
            debug!(
                funnel_id = current.funnel_id,
                node_id = %current.id,
                branch = ?branch,
                target = ?target.map(NodeId::as_str),
                "Decision resolved"
            );

            match target {
                None => return self.terminal(current.funnel_id),
                Some(id) => {
                    current = self
                        .store
                        .node(current.funnel_id, id)
                        .ok_or_else(|| FunnelError::not_found(RecordKind::Node, id))?;
                }
            }
        }
    }

    pub(crate) fn terminal(&self, funnel_id: FunnelId) -> FunnelResult<NextStep> {
        self.store
            .terminal(funnel_id)
            .map(NextStep::Terminal)
            .ok_or_else(|| FunnelError::not_found(RecordKind::Terminal, funnel_id))
    }
}

impl std::fmt::Debug for DecisionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEvaluator")
            .field("max_hops", &self.max_hops)
            .finish()
    }
}
