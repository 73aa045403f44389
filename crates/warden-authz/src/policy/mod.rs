//! Policy resolution.
//!
//! - [`condition`] - attribute conditions attached to grants
//! - [`context`] - request attributes conditions are evaluated against
//! - [`hierarchy`] - universal and compound action matching
//! - [`grant`] - effective grants (grant rows joined with permissions)
//! - [`engine`] - `decide`/`has_permission` evaluation and the resolver
//! - [`snapshot`] - literal `"resource:action"` permission sets
//!
//! # Evaluation
//!
//! ```ignore
//! use warden_authz::policy::{ActionHierarchy, RequestContext, decide};
//!
//! let context = RequestContext::new().with("isSelf", true);
//! let hierarchy = ActionHierarchy::default();
//! let decision = decide(&grants, &hierarchy, "profile", "update", Some(&context));
//! assert!(decision.is_allowed());
//! ```

pub mod condition;
pub mod context;
pub mod engine;
pub mod grant;
pub mod hierarchy;
pub mod snapshot;

pub use condition::{Condition, ConditionOperator, conditions_hold, parse_conditions};
pub use context::{IS_SELF, RequestContext, TARGET_ID};
pub use engine::{AccessDecision, DenyReason, PolicyResolver, decide, evaluate};
pub use grant::{EffectiveGrant, GrantSource};
pub use hierarchy::ActionHierarchy;
pub use snapshot::PermissionSnapshot;
