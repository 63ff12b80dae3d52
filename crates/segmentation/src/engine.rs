//! Default condition evaluator: checks a condition list against visitor facts.

use funnel_core::error::ConditionError;
use funnel_core::types::{Condition, VisitorFacts};
use funnel_core::ConditionEvaluator;
use tracing::debug;

use crate::predicates::{compare_values, ComparisonOperator};

/// How the conditions of one list are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    All,
    Any,
}

/// Evaluates conditions with the built-in operator registry.
#[derive(Debug, Clone)]
pub struct SegmentEvaluator {
    mode: MatchMode,
}

impl SegmentEvaluator {
    pub fn new() -> Self {
        Self {
            mode: MatchMode::All,
        }
    }

    pub fn with_mode(mode: MatchMode) -> Self {
        Self { mode }
    }

    fn check(&self, condition: &Condition, facts: &VisitorFacts) -> Result<bool, ConditionError> {
        if condition.field.trim().is_empty() {
            return Err(ConditionError::EmptyField);
        }

        let operator = ComparisonOperator::from_name(&condition.operator)
            .ok_or_else(|| ConditionError::UnknownOperator(condition.operator.clone()))?;

        if !operator.accepts(&condition.value) {
            return Err(ConditionError::MalformedValue {
                field: condition.field.clone(),
                operator: condition.operator.clone(),
                value: condition.value.clone(),
            });
        }

        let matched = match facts.get(&condition.field) {
            Some(actual) => compare_values(actual, &operator, &condition.value),
            None => compare_values(&serde_json::Value::Null, &operator, &condition.value)
                && matches!(
                    operator,
                    ComparisonOperator::IsNotSet
                        | ComparisonOperator::NotEquals
                        | ComparisonOperator::NotContains
                        | ComparisonOperator::NotInList
                ),
        };

        debug!(
            field = %condition.field,
            operator = ?operator,
            matched,
            "Condition evaluated"
        );
        Ok(matched)
    }
}

impl ConditionEvaluator for SegmentEvaluator {
    /// An empty list holds vacuously. Every condition is validated before
    /// combining, so a malformed condition fails the whole list.
    fn evaluate(
        &self,
        conditions: &[Condition],
        facts: &VisitorFacts,
    ) -> Result<bool, ConditionError> {
        let results = conditions
            .iter()
            .map(|c| self.check(c, facts))
            .collect::<Result<Vec<bool>, ConditionError>>()?;

        if results.is_empty() {
            return Ok(true);
        }

        Ok(match self.mode {
            MatchMode::All => results.iter().all(|r| *r),
            MatchMode::Any => results.iter().any(|r| *r),
        })
    }
}

impl Default for SegmentEvaluator {
    fn default() -> Self {
        Self::new()
    }
}
