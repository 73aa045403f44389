//! Enforcement guard.
//!
//! Each inbound operation declares static [`OperationMeta`]. The guard:
//!
//! 1. skips every check for public operations,
//! 2. verifies the bearer token (`Unauthorized` on failure),
//! 3. builds a context (`targetId`, `isSelf`) from request fields,
//! 4. asks the edge permission cache, which falls back to the resolver,
//! 5. fails with `Forbidden` when the answer is no.

pub mod context;
pub mod enforce;
pub mod middleware;
pub mod operation;
pub mod response;

pub use context::RequestFields;
pub use enforce::{AuthorizedPrincipal, EnforcementGuard};
pub use middleware::{Authorized, GuardLayer, GuardService, TARGET_PARAM, bearer_token};
pub use operation::{Access, OperationMeta};
pub use response::status_for;
