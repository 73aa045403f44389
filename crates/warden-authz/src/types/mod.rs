//! Authorization data model.
//!
//! - [`Principal`] - an authenticated actor
//! - [`Permission`] - a `(resource, action)` pair
//! - [`Group`] - a tenant-scoped bundle of grants
//! - [`UserPermission`], [`GroupPermission`], [`UserGroup`] - grant and
//!   membership rows

pub mod grant;
pub mod group;
pub mod permission;
pub mod principal;
pub mod tenant;

pub use grant::{Effect, GroupPermission, UserGroup, UserPermission};
pub use group::{Group, GroupUpdate, NewGroup, ProtectedGroups};
pub use permission::{Permission, permission_key};
pub use principal::Principal;
pub use tenant::TenantId;
