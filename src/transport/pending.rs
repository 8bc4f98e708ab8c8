/*!
 * Reply-Bound Commit
 *
 * Two-phase effects tied to the fate of a reply: the confirm action runs once
 * the reply is known to have reached the caller, the rollback action runs if
 * transmission failed.
 */

use super::types::Delivery;
use std::fmt;

type Action<S> = Box<dyn FnOnce(&mut S)>;

/// Settlement state of a [`Pending`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Awaiting the reply's fate
    Active,
    /// Confirm ran
    Committed,
    /// Rollback ran
    RolledBack,
}

/// At most one confirm and one rollback action against an in-flight reply
///
/// # Example
///
/// ```ignore
/// let mut pending = Pending::new();
/// pending.on_confirm(move |svc: &mut Service| svc.finish_close(pid, handle));
/// pending.on_rollback(move |svc: &mut Service| svc.release(handle));
/// // later, once the transport knows what happened to the reply
/// pending.settle(&mut svc, delivery);
/// ```
pub struct Pending<S> {
    commit: Option<Action<S>>,
    rollback: Option<Action<S>>,
}

impl<S> Pending<S> {
    pub fn new() -> Self {
        Self {
            commit: None,
            rollback: None,
        }
    }

    /// Register the confirm action, replacing any earlier one
    pub fn on_confirm<F>(&mut self, action: F) -> &mut Self
    where
        F: FnOnce(&mut S) + 'static,
    {
        debug_assert!(self.commit.is_none(), "confirm action registered twice");
        self.commit = Some(Box::new(action));
        self
    }

    /// Register the rollback action, replacing any earlier one
    pub fn on_rollback<F>(&mut self, action: F) -> &mut Self
    where
        F: FnOnce(&mut S) + 'static,
    {
        debug_assert!(self.rollback.is_none(), "rollback action registered twice");
        self.rollback = Some(Box::new(action));
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commit.is_none() && self.rollback.is_none()
    }

    /// Run exactly one side according to the reply's fate
    pub fn settle(self, state: &mut S, delivery: Delivery) -> PendingState {
        match delivery {
            Delivery::Delivered => {
                if let Some(commit) = self.commit {
                    commit(state);
                }
                PendingState::Committed
            }
            Delivery::Failed => {
                if let Some(rollback) = self.rollback {
                    rollback(state);
                }
                PendingState::RolledBack
            }
        }
    }
}

impl<S> Default for Pending<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for Pending<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("commit", &self.commit.is_some())
            .field("rollback", &self.rollback.is_some())
            .finish()
    }
}
