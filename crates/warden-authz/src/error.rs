//! Authorization error types.
//!
//! Every fallible operation in this crate returns [`AuthzError`]. Structural
//! and reference errors are raised at the mutation boundary; cache-tier
//! failures never reach this type (see [`crate::cache::CacheError`]).

use std::fmt;

use uuid::Uuid;

/// Errors that can occur while resolving or mutating authorization state.
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// A referenced principal, group, permission or grant does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// Identifier that failed to resolve.
        id: String,
    },

    /// Input failed structural validation (malformed condition, duplicate
    /// identity, missing required field).
    #[error("Validation failed: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// The caller is not allowed to perform the operation.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of why access is forbidden.
        message: String,
    },

    /// The request carries no valid principal identity.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// The policy store failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// A bounded store operation did not complete in time.
    #[error("Operation timed out: {operation}")]
    Timeout {
        /// Name of the operation that timed out.
        operation: &'static str,
    },

    /// The authorization configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },

    /// An unexpected failure while evaluating a permission check.
    #[error("Failed to evaluate {resource}:{action} for principal {principal}: {source}")]
    Evaluation {
        /// Principal being evaluated.
        principal: Uuid,
        /// Requested resource.
        resource: String,
        /// Requested action.
        action: String,
        /// Underlying failure.
        #[source]
        source: Box<AuthzError>,
    },
}

impl AuthzError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(operation: &'static str) -> Self {
        Self::Timeout { operation }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wraps an unexpected failure with the permission check it interrupted.
    #[must_use]
    pub fn evaluation(
        principal: Uuid,
        resource: impl Into<String>,
        action: impl Into<String>,
        source: AuthzError,
    ) -> Self {
        Self::Evaluation {
            principal,
            resource: resource.into(),
            action: action.into(),
            source: Box::new(source),
        }
    }

    /// Returns `true` if this error is a missing reference of the given kind.
    #[must_use]
    pub fn is_not_found(&self, kind: &str) -> bool {
        matches!(self, Self::NotFound { entity, .. } if *entity == kind)
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Validation { .. }
                | Self::Forbidden { .. }
                | Self::Unauthorized { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::Reference,
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Forbidden { .. } => ErrorCategory::Authorization,
            Self::Unauthorized { .. } => ErrorCategory::Authentication,
            Self::Storage { .. } | Self::Timeout { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
            Self::Evaluation { source, .. } => source.category(),
        }
    }

    /// Returns a stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Validation { .. } => "validation",
            Self::Forbidden { .. } => "forbidden",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Storage { .. } => "storage",
            Self::Timeout { .. } => "timeout",
            Self::Configuration { .. } => "configuration",
            Self::Internal { .. } => "internal",
            Self::Evaluation { .. } => "evaluation",
        }
    }
}

/// Categories of authorization errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Identity could not be established.
    Authentication,
    /// Identity was established but access was refused.
    Authorization,
    /// Malformed input.
    Validation,
    /// A referenced entity is missing.
    Reference,
    /// Storage or timeout failures.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Validation => write!(f, "validation"),
            Self::Reference => write!(f, "reference"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthzError::not_found("group", "g-1");
        assert_eq!(err.to_string(), "group not found: g-1");

        let err = AuthzError::validation("condition is missing 'operator'");
        assert_eq!(
            err.to_string(),
            "Validation failed: condition is missing 'operator'"
        );

        let err = AuthzError::timeout("load_grants");
        assert_eq!(err.to_string(), "Operation timed out: load_grants");
    }

    #[test]
    fn test_error_predicates() {
        assert!(AuthzError::forbidden("protected").is_client_error());
        assert!(AuthzError::unauthorized("no token").is_client_error());
        assert!(AuthzError::storage("down").is_server_error());
        assert!(AuthzError::timeout("commit").is_server_error());
        assert!(AuthzError::not_found("principal", "x").is_not_found("principal"));
        assert!(!AuthzError::not_found("group", "x").is_not_found("principal"));
    }

    #[test]
    fn test_evaluation_wraps_source_category() {
        let principal = Uuid::new_v4();
        let err = AuthzError::evaluation(
            principal,
            "staff",
            "read",
            AuthzError::storage("connection reset"),
        );

        assert_eq!(err.category(), ErrorCategory::Infrastructure);
        assert!(err.is_server_error());
        let rendered = err.to_string();
        assert!(rendered.contains("staff:read"));
        assert!(rendered.contains(&principal.to_string()));
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Reference.to_string(), "reference");
        assert_eq!(ErrorCategory::Authorization.to_string(), "authorization");
        assert_eq!(
            AuthzError::validation("x").category(),
            ErrorCategory::Validation
        );
    }
}
