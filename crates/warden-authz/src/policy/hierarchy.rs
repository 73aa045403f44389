//! Action hierarchy.
//!
//! Two kinds of actions widen what a grant covers:
//!
//! - **Universal** actions (`manage`, `admin`) match every action on their
//!   resource.
//! - **Compound** actions expand to a fixed set of concrete actions (e.g.
//!   `write` implies `create` and `update`). Expansion is one level deep.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::ActionConfig;

/// Universal and compound action tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionHierarchy {
    universal: BTreeSet<String>,
    compound: BTreeMap<String, BTreeSet<String>>,
}

impl Default for ActionHierarchy {
    fn default() -> Self {
        Self::from_config(&ActionConfig::default())
    }
}

impl ActionHierarchy {
    /// Builds the hierarchy from configuration.
    #[must_use]
    pub fn from_config(config: &ActionConfig) -> Self {
        Self {
            universal: config.universal.iter().cloned().collect(),
            compound: config
                .compound
                .iter()
                .map(|(action, implied)| (action.clone(), implied.iter().cloned().collect()))
                .collect(),
        }
    }

    /// Returns `true` if `action` is universal.
    #[must_use]
    pub fn is_universal(&self, action: &str) -> bool {
        self.universal.contains(action)
    }

    /// Returns the concrete actions a compound action implies.
    #[must_use]
    pub fn expand(&self, action: &str) -> Option<&BTreeSet<String>> {
        self.compound.get(action)
    }

    /// Returns `true` if a grant for `granted` covers a request for `requested`
    /// on the same resource.
    #[must_use]
    pub fn covers(&self, granted: &str, requested: &str) -> bool {
        granted == requested
            || self.is_universal(granted)
            || self
                .expand(granted)
                .is_some_and(|implied| implied.contains(requested))
    }

    /// Returns `action` followed by every action it literally implies.
    ///
    /// Universal actions are not expanded here.
    pub fn implied_actions<'a>(&'a self, action: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        std::iter::once(action).chain(
            self.expand(action)
                .into_iter()
                .flatten()
                .map(String::as_str),
        )
    }
}
