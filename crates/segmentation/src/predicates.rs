//! Operator registry and value comparison for segmentation conditions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    IsSet,
    IsNotSet,
    InList,
    NotInList,
}

impl ComparisonOperator {
    /// Resolves an operator name as stored on a condition. Accepts the
    /// segmentation editor's names (`is`, `is-not`, `is-greater-than`, ...),
    /// snake_case names and the symbolic forms.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('_', "-");
        let op = match normalized.as_str() {
            "is" | "equals" | "==" | "=" => ComparisonOperator::Equals,
            "is-not" | "not-equals" | "!=" => ComparisonOperator::NotEquals,
            "is-greater-than" | "greater-than" | ">" => ComparisonOperator::GreaterThan,
            "is-greater-than-or-equal" | "greater-than-or-equal" | ">=" => {
                ComparisonOperator::GreaterThanOrEqual
            }
            "is-less-than" | "less-than" | "<" => ComparisonOperator::LessThan,
            "is-less-than-or-equal" | "less-than-or-equal" | "<=" => {
                ComparisonOperator::LessThanOrEqual
            }
            "contains" => ComparisonOperator::Contains,
            "does-not-contain" | "not-contains" => ComparisonOperator::NotContains,
            "starts-with" => ComparisonOperator::StartsWith,
            "ends-with" => ComparisonOperator::EndsWith,
            "is-set" => ComparisonOperator::IsSet,
            "is-not-set" => ComparisonOperator::IsNotSet,
            "is-any-of" | "in-list" => ComparisonOperator::InList,
            "is-none-of" | "not-in-list" => ComparisonOperator::NotInList,
            _ => return None,
        };
        Some(op)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ComparisonOperator::GreaterThan
                | ComparisonOperator::GreaterThanOrEqual
                | ComparisonOperator::LessThan
                | ComparisonOperator::LessThanOrEqual
        )
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ComparisonOperator::InList | ComparisonOperator::NotInList)
    }

    /// Whether the operator can run against `expected` at all.
    pub fn accepts(&self, expected: &serde_json::Value) -> bool {
        if self.is_numeric() {
            return as_number(expected).is_some();
        }
        if self.is_list() {
            return expected.is_array();
        }
        true
    }
}

#[allow(clippy::unnecessary_map_or)]
pub fn compare_values(
    actual: &serde_json::Value,
    operator: &ComparisonOperator,
    expected: &serde_json::Value,
) -> bool {
    match operator {
        ComparisonOperator::Equals => loose_eq(actual, expected),
        ComparisonOperator::NotEquals => !loose_eq(actual, expected),
        ComparisonOperator::GreaterThan => {
            numeric_cmp(actual, expected).map_or(false, |o| o == std::cmp::Ordering::Greater)
        }
        ComparisonOperator::GreaterThanOrEqual => {
            numeric_cmp(actual, expected).map_or(false, |o| o != std::cmp::Ordering::Less)
        }
        ComparisonOperator::LessThan => {
            numeric_cmp(actual, expected).map_or(false, |o| o == std::cmp::Ordering::Less)
        }
        ComparisonOperator::LessThanOrEqual => {
            numeric_cmp(actual, expected).map_or(false, |o| o != std::cmp::Ordering::Greater)
        }
        ComparisonOperator::Contains => contains(actual, expected),
        ComparisonOperator::NotContains => !contains(actual, expected),
        ComparisonOperator::StartsWith => actual
            .as_str()
            .zip(expected.as_str())
            .map_or(false, |(a, e)| a.starts_with(e)),
        ComparisonOperator::EndsWith => actual
            .as_str()
            .zip(expected.as_str())
            .map_or(false, |(a, e)| a.ends_with(e)),
        ComparisonOperator::IsSet => !actual.is_null(),
        ComparisonOperator::IsNotSet => actual.is_null(),
        ComparisonOperator::InList => expected
            .as_array()
            .map_or(false, |list| list.iter().any(|v| loose_eq(actual, v))),
        ComparisonOperator::NotInList => expected
            .as_array()
            .map_or(true, |list| !list.iter().any(|v| loose_eq(actual, v))),
    }
}

/// Equality that treats `"100"` and `100` as the same value.
fn loose_eq(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    if a == b {
        return true;
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn contains(actual: &serde_json::Value, expected: &serde_json::Value) -> bool {
    if let Some(items) = actual.as_array() {
        return items.iter().any(|v| loose_eq(v, expected));
    }
    actual
        .as_str()
        .zip(expected.as_str())
        .is_some_and(|(a, e)| a.contains(e))
}

fn as_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn numeric_cmp(a: &serde_json::Value, b: &serde_json::Value) -> Option<std::cmp::Ordering> {
    let a_num = as_number(a)?;
    let b_num = as_number(b)?;
    a_num.partial_cmp(&b_num)
}
