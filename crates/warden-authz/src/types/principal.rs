//! Principal records.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// An authenticated actor (a staff/user identity) that can be authorized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Unique identifier, carried as `principalId` in access tokens.
    pub id: Uuid,

    /// Display name for logs and admin listings.
    pub display_name: String,

    /// When the principal was registered.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Principal {
    /// Creates a principal with a fresh identifier.
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), display_name)
    }

    /// Creates a principal with a known identifier.
    #[must_use]
    pub fn with_id(id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}
