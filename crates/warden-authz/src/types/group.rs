//! Groups and the protected built-in group set.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthzResult;
use crate::error::AuthzError;

use super::TenantId;

// =============================================================================
// Group
// =============================================================================

/// A tenant-scoped bundle of grants that principals can be members of.
///
/// `(name, tenant)` is unique. Inactive groups contribute no grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Unique identifier.
    pub id: Uuid,

    /// Group name (e.g., "admin", "front_desk").
    pub name: String,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Tenant the group belongs to.
    pub tenant: TenantId,

    /// Whether the group's grants are in effect.
    pub active: bool,

    /// When the group was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the group was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Group {
    /// Creates an active group with a fresh identifier.
    #[must_use]
    pub fn new(name: impl Into<String>, tenant: TenantId) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            tenant,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets whether the group is active.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Returns `true` if the group is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Input for creating a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGroup {
    /// Group name.
    pub name: String,

    /// Description.
    #[serde(default)]
    pub description: Option<String>,

    /// Owning tenant.
    pub tenant: TenantId,

    /// Whether the group starts active.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl NewGroup {
    /// Creates input for an active group.
    #[must_use]
    pub fn new(name: impl Into<String>, tenant: TenantId) -> Self {
        Self {
            name: name.into(),
            description: None,
            tenant,
            is_active: true,
        }
    }

    /// Validates the input.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the name is blank or too long.
    pub fn validate(&self) -> AuthzResult<()> {
        validate_group_name(&self.name)
    }

    /// Converts the input into a new group row.
    #[must_use]
    pub fn into_group(self) -> Group {
        let mut group = Group::new(self.name.trim(), self.tenant).with_active(self.is_active);
        group.description = self.description;
        group
    }
}

/// Partial update of a group. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupUpdate {
    /// New name.
    #[serde(default)]
    pub name: Option<String>,

    /// New description.
    #[serde(default)]
    pub description: Option<String>,

    /// New active flag.
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl GroupUpdate {
    /// Returns `true` if applying this update would change the group's name.
    #[must_use]
    pub fn renames(&self, group: &Group) -> bool {
        self.name
            .as_deref()
            .is_some_and(|name| name.trim() != group.name)
    }

    /// Applies the update to a copy of `group`.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` when renaming a group in `protected`, and
    /// `Validation` if the new name is invalid.
    pub fn apply(&self, group: &Group, protected: &ProtectedGroups) -> AuthzResult<Group> {
        if self.renames(group) && protected.contains(&group.name) {
            return Err(AuthzError::forbidden(format!(
                "group '{}' is protected and cannot be renamed",
                group.name
            )));
        }
        let mut updated = group.clone();
        if let Some(name) = &self.name {
            validate_group_name(name)?;
            updated.name = name.trim().to_string();
        }
        if let Some(description) = &self.description {
            updated.description = Some(description.clone());
        }
        if let Some(active) = self.is_active {
            updated.active = active;
        }
        updated.updated_at = OffsetDateTime::now_utc();
        Ok(updated)
    }
}

fn validate_group_name(name: &str) -> AuthzResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AuthzError::validation("group name is required"));
    }
    if name.len() > 100 {
        return Err(AuthzError::validation(
            "group name must be 100 characters or less",
        ));
    }
    Ok(())
}

// =============================================================================
// Protected Groups
// =============================================================================

/// The fixed set of built-in group names that cannot be renamed or deleted.
#[derive(Debug, Clone, Default)]
pub struct ProtectedGroups {
    names: HashSet<String>,
}

impl ProtectedGroups {
    /// Creates the set from configured names.
    #[must_use]
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if `name` is protected.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Iterates over protected names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        let mut names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        names.sort_unstable();
        names.into_iter()
    }
}
