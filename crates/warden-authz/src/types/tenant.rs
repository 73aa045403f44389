//! Tenant identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::AuthzResult;
use crate::config::DEFAULT_GLOBAL_TENANT;
use crate::error::AuthzError;

/// Scoping boundary for grants and memberships.
///
/// The reserved value configured as `global_tenant` (default `"global"`)
/// denotes the global tenant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a tenant identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The default global tenant.
    #[must_use]
    pub fn global() -> Self {
        Self(DEFAULT_GLOBAL_TENANT.to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks that the identifier can be embedded in a cache key.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the identifier is blank or contains `:`.
    pub fn validate(&self) -> AuthzResult<()> {
        if self.0.trim().is_empty() {
            return Err(AuthzError::validation("tenant is required"));
        }
        if self.0.contains(':') {
            return Err(AuthzError::validation("tenant must not contain ':'"));
        }
        Ok(())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TenantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(TenantId::new("acme").validate().is_ok());
        assert!(TenantId::global().validate().is_ok());
        assert!(TenantId::new("  ").validate().is_err());
        assert!(TenantId::new("acme:eu").validate().is_err());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let tenant = TenantId::from("acme");
        assert_eq!(serde_json::to_value(&tenant).unwrap(), "acme");
        assert_eq!(tenant.to_string(), "acme");
    }
}
