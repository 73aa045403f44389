//! Request context for condition evaluation.
//!
//! A [`RequestContext`] is a JSON object built from structured request
//! fields. Conditions look fields up by name or by dotted path.
//!
//! ```ignore
//! let context = RequestContext::new()
//!     .with(TARGET_ID, "2f1c...")
//!     .with(IS_SELF, true);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Context key holding the identifier of the record being acted on.
pub const TARGET_ID: &str = "targetId";

/// Context key set to `true` when a principal acts on its own record.
pub const IS_SELF: &str = "isSelf";

/// Map of request attributes that grant conditions are evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestContext {
    fields: Map<String, Value>,
}

impl RequestContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, returning the updated context.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts or replaces a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Returns a top-level field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Resolves a field path.
    ///
    /// An exact top-level key wins; otherwise the path is split on `.` and
    /// walked through nested objects.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.fields.get(path) {
            return Some(value);
        }
        let mut segments = path.split('.');
        let mut current = self.fields.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Returns `true` if the context has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of top-level fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Borrows the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl From<Map<String, Value>> for RequestContext {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}
