use std::sync::Arc;

use funnel_core::error::{FunnelError, FunnelResult, RecordKind};
use funnel_core::types::{FunnelId, NodeId, PageId, VisitorFacts};
use tracing::debug;

use crate::evaluator::DecisionEvaluator;
use crate::store::FunnelStore;
use crate::types::{FunnelNode, NextStep};

/// Structural navigation over a funnel: node lookup and successors.
#[derive(Clone)]
pub struct StepResolver {
    store: Arc<dyn FunnelStore>,
    decisions: DecisionEvaluator,
}

impl StepResolver {
    pub fn new(store: Arc<dyn FunnelStore>, decisions: DecisionEvaluator) -> Self {
        Self { store, decisions }
    }

    pub fn decisions(&self) -> &DecisionEvaluator {
        &self.decisions
    }

    pub fn current(&self, funnel_id: FunnelId, node_id: &NodeId) -> FunnelResult<FunnelNode> {
        self.store
            .node(funnel_id, node_id)
            .ok_or_else(|| FunnelError::not_found(RecordKind::Node, node_id))
    }

    /// Looks a step up by the page the visitor is on.
    pub fn current_page(&self, page_id: PageId) -> FunnelResult<FunnelNode> {
        self.store
            .node_by_page(page_id)
            .ok_or_else(|| FunnelError::not_found(RecordKind::Page, page_id))
    }

    pub fn terminal(&self, funnel_id: FunnelId) -> FunnelResult<NextStep> {
        self.decisions.terminal(funnel_id)
    }

    /// Forward successor. Decision nodes resolve themselves; other steps
    /// follow their first target.
    pub fn next(&self, node: &FunnelNode, facts: &VisitorFacts) -> FunnelResult<NextStep> {
        if node.is_decision() {
            return self.decisions.resolve(node, facts);
        }
        self.follow(node, node.forward(), facts)
    }

    /// Reject successor: the no-edge of a decision, or the reject edge of an
    /// upsell/downsell.
    pub fn next_no(&self, node: &FunnelNode, facts: &VisitorFacts) -> FunnelResult<NextStep> {
        self.follow(node, node.reject(), facts)
    }

    fn follow(
        &self,
        from: &FunnelNode,
        target: Option<&NodeId>,
        facts: &VisitorFacts,
    ) -> FunnelResult<NextStep> {
        let Some(id) = target else {
            debug!(funnel_id = from.funnel_id, node_id = %from.id, "No target, using terminal");
            return self.terminal(from.funnel_id);
        };
        let node = self.current(from.funnel_id, id)?;
        if node.is_decision() {
            return self.decisions.resolve(&node, facts);
        }
        Ok(NextStep::Step(node))
    }

    /// Upsell and downsell steps of a funnel, in editor order.
    pub fn offer_steps(&self, funnel_id: FunnelId) -> Vec<FunnelNode> {
        self.store
            .nodes(funnel_id)
            .into_iter()
            .filter(|n| n.step_type.is_offer())
            .collect()
    }
}

impl std::fmt::Debug for StepResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepResolver")
            .field("decisions", &self.decisions)
            .finish()
    }
}
