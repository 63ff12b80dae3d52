use funnel_core::error::{FunnelError, FunnelResult};
use funnel_core::types::BumpSelectionState;
use serde::{Deserialize, Serialize};

/// A single permitted move between selection states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionTransition {
    pub from: BumpSelectionState,
    pub to: BumpSelectionState,
    pub trigger: String,
}

/// Guards the per-request lifecycle of one offered bump or upsell.
#[derive(Debug, Clone)]
pub struct SelectionStateMachine {
    pub state: BumpSelectionState,
    pub transitions: Vec<SelectionTransition>,
}

impl SelectionStateMachine {
    /// Starts in `NotOffered`.
    pub fn new() -> Self {
        Self::starting_at(BumpSelectionState::NotOffered)
    }

    pub fn starting_at(state: BumpSelectionState) -> Self {
        use funnel_core::types::BumpSelectionState::*;

        let transitions = [
            (NotOffered, Offered, "conditions_met"),
            (Offered, Accepted, "accept"),
            (Offered, Rejected, "reject"),
            // Checkbox bumps can be unticked again.
            (Accepted, Offered, "deselect"),
        ]
        .into_iter()
        .map(|(from, to, trigger)| SelectionTransition {
            from,
            to,
            trigger: trigger.to_string(),
        })
        .collect();

        Self { state, transitions }
    }

    pub fn can_transition(&self, from: &BumpSelectionState, to: &BumpSelectionState) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == *from && t.to == *to)
    }

    pub fn transition(&mut self, to: BumpSelectionState) -> FunnelResult<()> {
        if self.state == to {
            return Ok(());
        }
        if self.can_transition(&self.state, &to) {
            self.state = to;
            Ok(())
        } else {
            Err(FunnelError::Validation(format!(
                "Invalid selection transition from {:?} to {:?}",
                self.state, to
            )))
        }
    }
}

impl Default for SelectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
