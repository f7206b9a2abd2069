use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::context::{Context, FieldPath};
use crate::template::render_value;

/// Tolerance used for float equality across both the condition evaluator and
/// the metric threshold evaluator, so the two never drift apart.
pub const FLOAT_TOLERANCE: f64 = 1e-3;

/// Comparison operator shared by conditions and metric thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
}

impl CompareOp {
    /// Compare a (possibly absent) context value against an expected value.
    /// Never panics: non-numeric operands fail numeric comparisons, and a
    /// missing field fails every operator except `NotEquals` against a
    /// non-null expected value.
    pub fn compare(&self, actual: Option<&Value>, expected: &Value) -> bool {
        match self {
            CompareOp::Equals => actual
                .map(|value| values_equal(value, expected))
                .unwrap_or(false),
            CompareOp::NotEquals => match actual {
                Some(value) => !values_equal(value, expected),
                // A field that is not set is "not equal" to any concrete
                // value, but it is not "not equal" to null.
                None => !expected.is_null(),
            },
            CompareOp::Contains => actual
                .map(|value| render_value(value).contains(&render_value(expected)))
                .unwrap_or(false),
            CompareOp::GreaterThan | CompareOp::LessThan => {
                match (actual.and_then(as_number), as_number(expected)) {
                    (Some(lhs), Some(rhs)) => self.compare_numbers(lhs, rhs),
                    _ => false,
                }
            }
        }
    }

    /// Numeric comparison used by both condition and threshold evaluation.
    pub fn compare_numbers(&self, actual: f64, expected: f64) -> bool {
        match self {
            CompareOp::Equals => (actual - expected).abs() < FLOAT_TOLERANCE,
            CompareOp::NotEquals => (actual - expected).abs() >= FLOAT_TOLERANCE,
            CompareOp::GreaterThan => actual > expected,
            CompareOp::LessThan => actual < expected,
            // Substring matching has no numeric meaning.
            CompareOp::Contains => false,
        }
    }
}

/// Field-comparison predicate gating whether a matched trigger fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    pub field: FieldPath,
    pub operator: CompareOp,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<FieldPath>, operator: CompareOp, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn evaluate(&self, context: &Context) -> bool {
        self.operator.compare(context.get(&self.field), &self.value)
    }
}

/// AND-evaluate an ordered condition list, short-circuiting on the first
/// failure. Pure function; an empty list matches everything.
pub fn evaluate_all(conditions: &[Condition], context: &Context) -> bool {
    for condition in conditions {
        if !condition.evaluate(context) {
            trace!(field = condition.field.as_str(), "condition failed");
            return false;
        }
    }
    true
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(lhs), Value::Number(rhs)) => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(l), Some(r)) => CompareOp::Equals.compare_numbers(l, r),
            _ => lhs == rhs,
        },
        _ => left == right,
    }
}
