//! Grant management: the write side of the authorization model.
//!
//! - [`service`] - validated mutations with version bump and cache
//!   invalidation
//! - [`bootstrap`] - built-in permission catalog and protected groups

pub mod bootstrap;
pub mod service;

pub use bootstrap::{
    AdminSeed, BUILTIN_ACTIONS, BUILTIN_RESOURCES, BootstrapPlan, BootstrapReport,
    SUPER_ADMIN_GROUP, bootstrap,
};
pub use service::GrantManager;
