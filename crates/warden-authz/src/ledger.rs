//! Auth version ledger.
//!
//! One monotonic counter per principal. A principal without a row is at
//! [`INITIAL_AUTH_VERSION`]; the first bump therefore produces version 2.
//! Versions only decrease through an explicit [`AuthVersionLedger::reset`].
//!
//! Grant mutations do not call [`AuthVersionLedger::bump`] directly: the
//! store bumps inside [`crate::storage::PolicyStore::commit`] so the write
//! and the increment form one unit. `bump` is exposed for stores and for
//! callers that need to invalidate without a grant change.

use async_trait::async_trait;
use uuid::Uuid;

use crate::AuthzResult;

/// Version of a principal that has no ledger row yet.
pub const INITIAL_AUTH_VERSION: i64 = 1;

/// Returns the version that follows `current` (`None` = no row yet).
#[must_use]
pub fn next_version(current: Option<i64>) -> i64 {
    current.unwrap_or(INITIAL_AUTH_VERSION) + 1
}

/// Per-principal auth version counters.
#[async_trait]
pub trait AuthVersionLedger: Send + Sync {
    /// Current version, or [`INITIAL_AUTH_VERSION`] if the principal has no
    /// row.
    async fn current(&self, principal_id: Uuid) -> AuthzResult<i64>;

    /// Returns the current version, creating the row at
    /// [`INITIAL_AUTH_VERSION`] if it does not exist.
    async fn ensure(&self, principal_id: Uuid) -> AuthzResult<i64>;

    /// Increments every listed principal by one as a single atomic unit and
    /// returns the new versions in input order.
    async fn bump(&self, principal_ids: &[Uuid]) -> AuthzResult<Vec<(Uuid, i64)>>;

    /// Resets a principal to [`INITIAL_AUTH_VERSION`].
    async fn reset(&self, principal_id: Uuid) -> AuthzResult<()>;
}
