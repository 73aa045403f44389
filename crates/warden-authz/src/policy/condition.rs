//! Grant conditions.
//!
//! A condition is `{ field, operator, value }` with one of four operators.
//! Conditions are validated when a grant is written; evaluation itself never
//! fails.
//!
//! | Operator   | Holds when                                                   |
//! |------------|--------------------------------------------------------------|
//! | `eq`       | the context field equals `value`                             |
//! | `ne`       | the context field is absent or differs from `value`          |
//! | `in`       | the context field equals one element of the `value` array    |
//! | `contains` | the context field is an array holding `value`, or a string   |
//! |            | containing the string `value`                                |

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AuthzResult;
use crate::error::AuthzError;

use super::context::RequestContext;

/// Closed set of condition operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOperator {
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Membership of the context value in an array of allowed values.
    In,
    /// Containment of `value` in the context value.
    Contains,
}

impl ConditionOperator {
    /// Parses the wire name of an operator.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "in" => Some(Self::In),
            "contains" => Some(Self::Contains),
            _ => None,
        }
    }

    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::In => "in",
            Self::Contains => "contains",
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validated condition attached to a grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Context field name or dotted path.
    pub field: String,
    /// Comparison operator.
    pub operator: ConditionOperator,
    /// Operand.
    pub value: Value,
}

impl Condition {
    /// Creates a condition.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Shorthand for an `eq` condition.
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOperator::Eq, value)
    }

    /// Parses and validates a raw condition definition.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the definition is not an object, if `field`,
    /// `operator` or `value` is missing, if the operator is unknown, or if an
    /// `in` operand is not an array.
    pub fn from_value(raw: &Value) -> AuthzResult<Self> {
        let object = raw
            .as_object()
            .ok_or_else(|| AuthzError::validation("condition must be an object"))?;

        let field = match object.get("field") {
            Some(Value::String(field)) if !field.trim().is_empty() => field.clone(),
            Some(_) => {
                return Err(AuthzError::validation(
                    "condition 'field' must be a non-empty string",
                ));
            }
            None => return Err(AuthzError::validation("condition is missing 'field'")),
        };

        let operator = match object.get("operator") {
            Some(Value::String(name)) => ConditionOperator::parse(name).ok_or_else(|| {
                AuthzError::validation(format!(
                    "condition operator '{name}' is not one of eq, ne, in, contains"
                ))
            })?,
            Some(_) => {
                return Err(AuthzError::validation(
                    "condition 'operator' must be a string",
                ));
            }
            None => return Err(AuthzError::validation("condition is missing 'operator'")),
        };

        let value = object
            .get("value")
            .cloned()
            .ok_or_else(|| AuthzError::validation("condition is missing 'value'"))?;

        let condition = Self {
            field,
            operator,
            value,
        };
        condition.validate()?;
        Ok(condition)
    }

    /// Validates operator/operand compatibility.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the condition is structurally unusable.
    pub fn validate(&self) -> AuthzResult<()> {
        if self.field.trim().is_empty() {
            return Err(AuthzError::validation(
                "condition 'field' must be a non-empty string",
            ));
        }
        if self.operator == ConditionOperator::In && !self.value.is_array() {
            return Err(AuthzError::validation(format!(
                "condition on '{}': operator 'in' requires an array value",
                self.field
            )));
        }
        Ok(())
    }

    /// Evaluates the condition against a context.
    #[must_use]
    pub fn evaluate(&self, context: &RequestContext) -> bool {
        let actual = context.lookup(&self.field);
        match self.operator {
            ConditionOperator::Eq => actual == Some(&self.value),
            ConditionOperator::Ne => actual != Some(&self.value),
            ConditionOperator::In => match (&self.value, actual) {
                (Value::Array(allowed), Some(actual)) => allowed.contains(actual),
                _ => false,
            },
            ConditionOperator::Contains => match actual {
                Some(Value::Array(items)) => items.contains(&self.value),
                Some(Value::String(haystack)) => self
                    .value
                    .as_str()
                    .is_some_and(|needle| haystack.contains(needle)),
                _ => false,
            },
        }
    }
}

/// Parses an optional list of raw condition definitions.
///
/// `None` and an empty list both mean "unconditional".
///
/// # Errors
///
/// Returns the first `Validation` error, prefixed with the condition index.
pub fn parse_conditions(raw: Option<&[Value]>) -> AuthzResult<Vec<Condition>> {
    raw.unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(index, value)| {
            Condition::from_value(value).map_err(|e| match e {
                AuthzError::Validation { message } => {
                    AuthzError::validation(format!("conditions[{index}]: {message}"))
                }
                other => other,
            })
        })
        .collect()
}

/// Returns `true` if a grant's condition list is satisfied.
///
/// No conditions is trivially satisfied. Conditions present but no context
/// is never satisfied. Otherwise every condition must hold.
#[must_use]
pub fn conditions_hold(conditions: &[Condition], context: Option<&RequestContext>) -> bool {
    if conditions.is_empty() {
        return true;
    }
    match context {
        Some(context) => conditions.iter().all(|c| c.evaluate(context)),
        None => false,
    }
}
