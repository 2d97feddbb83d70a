//! Rule conditions evaluated against trigger data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison applied by a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    In,
    Exists,
    NotExists,
}

/// A single predicate over trigger data.
///
/// `field` is a dot path (`project.value`, `contact.email`). Numeric
/// strings compare numerically against numeric operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn evaluate(&self, data: &Value) -> bool {
        let actual = lookup_path(data, &self.field);

        match self.operator {
            ConditionOperator::Exists => actual.is_some_and(|v| !v.is_null()),
            ConditionOperator::NotExists => actual.is_none_or(Value::is_null),
            ConditionOperator::Equals => actual.is_some_and(|v| loosely_equal(v, &self.value)),
            ConditionOperator::NotEquals => !actual.is_some_and(|v| loosely_equal(v, &self.value)),
            ConditionOperator::Contains => actual.is_some_and(|v| contains(v, &self.value)),
            ConditionOperator::NotContains => !actual.is_some_and(|v| contains(v, &self.value)),
            ConditionOperator::GreaterThan => compare(actual, &self.value)
                .is_some_and(|o| o == std::cmp::Ordering::Greater),
            ConditionOperator::LessThan => compare(actual, &self.value)
                .is_some_and(|o| o == std::cmp::Ordering::Less),
            ConditionOperator::In => match (&self.value, actual) {
                (Value::Array(options), Some(v)) => options.iter().any(|o| loosely_equal(v, o)),
                _ => false,
            },
        }
    }
}

/// Evaluate every condition; all must pass.
pub fn all_conditions_pass(conditions: &[Condition], data: &Value) -> bool {
    conditions.iter().all(|c| c.evaluate(data))
}

fn lookup_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(data, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => match (actual, expected) {
            (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
            (Value::Bool(a), Value::String(b)) | (Value::String(b), Value::Bool(a)) => {
                b.parse::<bool>().is_ok_and(|b| b == *a)
            }
            _ => false,
        },
    }
}

fn contains(actual: &Value, needle: &Value) -> bool {
    match actual {
        Value::String(s) => needle
            .as_str()
            .is_some_and(|n| s.to_lowercase().contains(&n.to_lowercase())),
        Value::Array(items) => items.iter().any(|i| loosely_equal(i, needle)),
        _ => false,
    }
}

fn compare(actual: Option<&Value>, expected: &Value) -> Option<std::cmp::Ordering> {
    let a = as_number(actual?)?;
    let b = as_number(expected)?;
    a.partial_cmp(&b)
}
