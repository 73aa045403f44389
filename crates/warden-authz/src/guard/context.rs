//! Request context extraction.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::policy::{IS_SELF, RequestContext, TARGET_ID};

/// Structured request fields the guard derives a context from.
#[derive(Debug, Clone, Default)]
pub struct RequestFields {
    /// Identifier of the record the operation targets (e.g. the `{id}` path
    /// segment).
    pub target_id: Option<String>,
    /// Additional attributes copied into the context verbatim.
    pub attributes: Map<String, Value>,
}

impl RequestFields {
    /// Fields for an operation on `target_id`.
    #[must_use]
    pub fn targeting(target_id: impl Into<String>) -> Self {
        Self {
            target_id: Some(target_id.into()),
            attributes: Map::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Builds the evaluation context for `principal`.
    ///
    /// `isSelf` is `true` only when the target id equals the principal id.
    /// Attributes never override `targetId` or `isSelf`.
    #[must_use]
    pub fn to_context(&self, principal: Uuid) -> RequestContext {
        let mut context = RequestContext::from(self.attributes.clone());
        let is_self = self
            .target_id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id).ok())
            .is_some_and(|id| id == principal);

        if let Some(target) = &self.target_id {
            context.insert(TARGET_ID, target.clone());
        }
        context.insert(IS_SELF, is_self);
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_self() {
        let principal = Uuid::new_v4();

        let own = RequestFields::targeting(principal.to_string()).to_context(principal);
        assert_eq!(own.get(IS_SELF), Some(&json!(true)));
        assert_eq!(own.get(TARGET_ID), Some(&json!(principal.to_string())));

        let other = RequestFields::targeting(Uuid::new_v4().to_string()).to_context(principal);
        assert_eq!(other.get(IS_SELF), Some(&json!(false)));

        let none = RequestFields::default().to_context(principal);
        assert_eq!(none.get(IS_SELF), Some(&json!(false)));
        assert!(none.get(TARGET_ID).is_none());
    }

    #[test]
    fn test_attributes_cannot_spoof_is_self() {
        let principal = Uuid::new_v4();
        let context = RequestFields::default()
            .with_attribute(IS_SELF, true)
            .with_attribute("department", "oncology")
            .to_context(principal);

        assert_eq!(context.get(IS_SELF), Some(&json!(false)));
        assert_eq!(context.get("department"), Some(&json!("oncology")));
    }
}
