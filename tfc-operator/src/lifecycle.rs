//! Finalizer and deletion lifecycle.
//!
//! [`decide`] is the whole state machine: a pure function from what the
//! object looks like to what the orchestrator must do next.

use crate::crd::{DeletionPolicy, ManagedResource};
use crate::store::has_finalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PendingFinalizerAttach,
    Active,
    PendingDeletion,
    Gone,
}

/// Lifecycle-relevant facts about an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub deleting: bool,
    pub has_finalizer: bool,
    pub has_remote_id: bool,
}

impl Observation {
    pub fn of<K: ManagedResource>(obj: &K) -> Self {
        Self {
            deleting: obj.meta().deletion_timestamp.is_some(),
            has_finalizer: has_finalizer(obj),
            has_remote_id: obj.remote_id().is_some(),
        }
    }

    pub fn phase(&self) -> Phase {
        match (self.deleting, self.has_finalizer) {
            (false, false) => Phase::PendingFinalizerAttach,
            (false, true) => Phase::Active,
            (true, true) => Phase::PendingDeletion,
            (true, false) => Phase::Gone,
        }
    }
}

/// What the pass does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do remotely.
    Skip,
    /// Run the convergence steps.
    Converge,
    /// Run remote cleanup under the given policy.
    Cleanup(DeletionPolicy),
}

/// What happens to the finalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerChange {
    Keep,
    /// Attach and stop; the next pass proceeds.
    Attach,
    Remove,
    /// Remove once cleanup reports done.
    RemoveWhenClean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub finalizer: FinalizerChange,
}

pub fn decide(obs: Observation, policy: DeletionPolicy) -> Decision {
    let (action, finalizer) = match obs.phase() {
        Phase::PendingFinalizerAttach => (Action::Skip, FinalizerChange::Attach),
        Phase::Active => (Action::Converge, FinalizerChange::Keep),
        Phase::Gone => (Action::Skip, FinalizerChange::Keep),
        Phase::PendingDeletion if !obs.has_remote_id => (Action::Skip, FinalizerChange::Remove),
        Phase::PendingDeletion => match policy {
            DeletionPolicy::Retain => (Action::Skip, FinalizerChange::Remove),
            other => (Action::Cleanup(other), FinalizerChange::RemoveWhenClean),
        },
    };
    Decision { action, finalizer }
}
