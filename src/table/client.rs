/*!
 * Clients
 * Per-process bookkeeping: owned handles, fork translation, wait mode
 */

use crate::core::types::{EventMask, HandleId, Pid};
use crate::transport::{Call, Endpoint};
use ahash::HashMap;

/// A call parked until its handle becomes ready
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waiter {
    /// Real handle the call waits on
    pub handle: HandleId,
    pub wanted: EventMask,
    pub call: Call,
}

/// How a client learns about readiness; the modes are mutually exclusive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WaitMode {
    #[default]
    Idle,
    /// A single call parked on the next matching event
    Blocked(Waiter),
    /// Events are pushed to an external relay
    Notify { relay: Endpoint },
}

/// One consumer process
pub struct Client {
    pub(crate) pid: Pid,
    pub(crate) handles: Vec<HandleId>,
    /// Visible handle number -> shadow handle, filled by fork replication
    pub(crate) translation: HashMap<HandleId, HandleId>,
    pub(crate) mode: WaitMode,
}

impl Client {
    pub(crate) fn new(pid: Pid) -> Self {
        Self {
            pid,
            handles: Vec::new(),
            translation: HashMap::default(),
            mode: WaitMode::Idle,
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn handles(&self) -> &[HandleId] {
        &self.handles
    }

    #[inline]
    pub fn mode(&self) -> &WaitMode {
        &self.mode
    }

    /// Shadow handle standing in for `visible`, if any
    #[inline]
    pub fn translate(&self, visible: HandleId) -> Option<HandleId> {
        self.translation.get(&visible).copied()
    }

    pub fn translations(&self) -> impl Iterator<Item = (HandleId, HandleId)> + '_ {
        self.translation.iter().map(|(&visible, &shadow)| (visible, shadow))
    }

    pub(crate) fn attach(&mut self, handle: HandleId) -> usize {
        self.handles.push(handle);
        self.handles.len() - 1
    }

    /// Swap-remove; returns the handle moved into `slot`
    pub(crate) fn detach(&mut self, slot: usize) -> Option<HandleId> {
        self.handles.swap_remove(slot);
        self.handles.get(slot).copied()
    }

    /// Drop a parked waiter, if one exists
    pub(crate) fn cancel_waiter(&mut self) -> Option<Waiter> {
        match std::mem::take(&mut self.mode) {
            WaitMode::Blocked(waiter) => Some(waiter),
            other => {
                self.mode = other;
                None
            }
        }
    }
}
