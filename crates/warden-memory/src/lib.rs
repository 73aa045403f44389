//! In-memory policy store for Warden.
//!
//! This crate provides [`MemoryPolicyStore`], an implementation of both
//! [`PolicyStore`] and [`AuthVersionLedger`] from `warden-authz` that keeps
//! all state behind one `tokio::sync::RwLock`.
//!
//! # Example
//!
//! ```ignore
//! use warden_memory::create_policy_store;
//! use warden_authz::{PolicyStore, AuthVersionLedger};
//!
//! let store = create_policy_store();
//! let version = store.ensure(principal_id).await?;
//! ```

mod state;
pub mod store;

pub use store::MemoryPolicyStore;
pub use warden_authz::{AuthVersionLedger, PolicyStore};

/// Creates a new in-memory store, shareable as both store and ledger.
pub fn create_policy_store() -> std::sync::Arc<MemoryPolicyStore> {
    std::sync::Arc::new(MemoryPolicyStore::new())
}
