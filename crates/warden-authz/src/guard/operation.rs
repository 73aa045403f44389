//! Static operation metadata.

use std::fmt;

/// What an operation requires from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// No identity and no permission check.
    Public,
    /// A valid principal, but no permission check.
    Authenticated,
    /// A valid principal holding `action` on `resource`.
    Permission {
        /// Required resource.
        resource: &'static str,
        /// Required action.
        action: &'static str,
    },
}

/// Declares an operation and its access requirement.
///
/// ```ignore
/// const GROUP_DELETE: OperationMeta =
///     OperationMeta::permission("group.delete", "group", "delete");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationMeta {
    /// Operation name used in logs and error messages.
    pub name: &'static str,
    /// Access requirement.
    pub access: Access,
}

impl OperationMeta {
    /// An operation anyone may call.
    #[must_use]
    pub const fn public(name: &'static str) -> Self {
        Self {
            name,
            access: Access::Public,
        }
    }

    /// An operation that only requires a valid principal.
    #[must_use]
    pub const fn authenticated(name: &'static str) -> Self {
        Self {
            name,
            access: Access::Authenticated,
        }
    }

    /// An operation that requires `action` on `resource`.
    #[must_use]
    pub const fn permission(
        name: &'static str,
        resource: &'static str,
        action: &'static str,
    ) -> Self {
        Self {
            name,
            access: Access::Permission { resource, action },
        }
    }

    /// Returns `true` if the operation skips every check.
    #[must_use]
    pub const fn is_public(&self) -> bool {
        matches!(self.access, Access::Public)
    }

    /// The `(resource, action)` pair the operation requires, if any.
    #[must_use]
    pub const fn required(&self) -> Option<(&'static str, &'static str)> {
        match self.access {
            Access::Permission { resource, action } => Some((resource, action)),
            Access::Public | Access::Authenticated => None,
        }
    }
}

impl fmt::Display for OperationMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.access {
            Access::Public => write!(f, "{} (public)", self.name),
            Access::Authenticated => write!(f, "{} (authenticated)", self.name),
            Access::Permission { resource, action } => {
                write!(f, "{} ({resource}:{action})", self.name)
            }
        }
    }
}
