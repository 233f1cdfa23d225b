//! The permission graph: first-class grant values.
//!
//! Each grant is a `(principal, resource, action-set)` triple kept in a
//! plain list, so tests can enumerate exactly what access exists. Grants
//! are additive only and evaluated independently per pair; no grant
//! expresses a time bound or condition.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resource::ResourceToken;

/// A single action a principal may perform on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Read,
    Write,
    Invoke,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Read => write!(f, "read"),
            Action::Write => write!(f, "write"),
            Action::Invoke => write!(f, "invoke"),
        }
    }
}

/// An ordered set of actions. Set semantics make re-applied grants
/// idempotent by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionSet(BTreeSet<Action>);

impl ActionSet {
    /// Read and write access, for table and bucket principals.
    pub fn read_write() -> Self {
        Self([Action::Read, Action::Write].into_iter().collect())
    }

    /// Invoke-only access, for function-to-function calls.
    pub fn invoke() -> Self {
        Self([Action::Invoke].into_iter().collect())
    }

    /// Returns true if the set contains the action.
    pub fn allows(&self, action: Action) -> bool {
        self.0.contains(&action)
    }

    /// Iterates the actions in order.
    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A declarative statement authorizing a principal (always a function)
/// to perform a set of actions on a target resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub principal: ResourceToken,
    pub target: ResourceToken,
    pub actions: ActionSet,
}

impl Grant {
    /// Creates a grant.
    pub fn new(principal: ResourceToken, target: ResourceToken, actions: ActionSet) -> Self {
        Self {
            principal,
            target,
            actions,
        }
    }

    /// Returns true if this grant lets `principal` perform `action` on `target`.
    pub fn allows(&self, principal: &ResourceToken, target: &ResourceToken, action: Action) -> bool {
        &self.principal == principal && &self.target == target && self.actions.allows(action)
    }
}

/// A broad provider-managed policy attached to a function's role.
///
/// Full access to an external service rather than a scoped action set.
/// Accepted as a prototyping simplification; the validator flags every
/// attachment as an over-broad grant instead of treating it as correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedPolicyAttachment {
    pub principal: ResourceToken,
    pub policy_name: String,
}

impl ManagedPolicyAttachment {
    pub fn new(principal: ResourceToken, policy_name: impl Into<String>) -> Self {
        Self {
            principal,
            policy_name: policy_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_set_semantics() {
        let rw = ActionSet::read_write();
        assert!(rw.allows(Action::Read));
        assert!(rw.allows(Action::Write));
        assert!(!rw.allows(Action::Invoke));

        let invoke = ActionSet::invoke();
        assert!(invoke.allows(Action::Invoke));
        assert!(!invoke.allows(Action::Read));
    }

    #[test]
    fn test_grant_is_directional() {
        let api = ResourceToken::for_id("api");
        let worker = ResourceToken::for_id("worker");
        let grant = Grant::new(api.clone(), worker.clone(), ActionSet::invoke());
        assert!(grant.allows(&api, &worker, Action::Invoke));
        assert!(!grant.allows(&worker, &api, Action::Invoke));
    }

    #[test]
    fn test_duplicate_actions_collapse() {
        let set: ActionSet = [Action::Read, Action::Read, Action::Write]
            .into_iter()
            .collect();
        assert_eq!(set.iter().count(), 2);
    }
}
