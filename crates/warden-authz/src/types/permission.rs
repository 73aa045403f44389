//! Permission definitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AuthzResult;
use crate::error::AuthzError;

/// Renders the literal `"<resource>:<action>"` form used by snapshots.
#[must_use]
pub fn permission_key(resource: &str, action: &str) -> String {
    format!("{resource}:{action}")
}

/// A `(resource, action)` pair that grants can reference.
///
/// The pair is globally unique and immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    /// Unique identifier.
    pub id: Uuid,

    /// Resource name (e.g., `staff`).
    pub resource: String,

    /// Action name (e.g., `read`, `write`, `manage`).
    pub action: String,

    /// What the permission allows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Permission {
    /// Creates a permission with a fresh identifier.
    #[must_use]
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource: resource.into(),
            action: action.into(),
            description: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the `"resource:action"` key.
    #[must_use]
    pub fn key(&self) -> String {
        permission_key(&self.resource, &self.action)
    }

    /// Validates the resource and action components.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if either component is empty or contains `:` or
    /// whitespace, which would make the snapshot key ambiguous.
    pub fn validate(&self) -> AuthzResult<()> {
        for (label, value) in [("resource", &self.resource), ("action", &self.action)] {
            if value.is_empty() {
                return Err(AuthzError::validation(format!(
                    "permission {label} is required"
                )));
            }
            if value.contains(':') || value.chars().any(char::is_whitespace) {
                return Err(AuthzError::validation(format!(
                    "permission {label} '{value}' must not contain ':' or whitespace"
                )));
            }
        }
        Ok(())
    }
}
