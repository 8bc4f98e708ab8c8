/*!
 * Lifecycle Events
 */

use crate::core::types::{Pid, Signal};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleKind {
    Fork { child: Pid },
    Exec,
    Exit { signal: Signal, status: i32, code: i32 },
}

/// A lifecycle event tagged with the originating process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub pid: Pid,
    pub kind: LifecycleKind,
}

impl LifecycleEvent {
    #[inline]
    pub fn fork(parent: Pid, child: Pid) -> Self {
        Self {
            pid: parent,
            kind: LifecycleKind::Fork { child },
        }
    }

    #[inline]
    pub fn exec(pid: Pid) -> Self {
        Self {
            pid,
            kind: LifecycleKind::Exec,
        }
    }

    #[inline]
    pub fn exit(pid: Pid, signal: Signal, status: i32, code: i32) -> Self {
        Self {
            pid,
            kind: LifecycleKind::Exit {
                signal,
                status,
                code,
            },
        }
    }

    /// Subscription bit this event is delivered under
    pub fn kinds(&self) -> EventKinds {
        match self.kind {
            LifecycleKind::Fork { .. } => EventKinds::FORK,
            LifecycleKind::Exec => EventKinds::EXEC,
            LifecycleKind::Exit { .. } => EventKinds::EXIT,
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LifecycleKind::Fork { child } => write!(f, "fork({} -> {})", self.pid, child),
            LifecycleKind::Exec => write!(f, "exec({})", self.pid),
            LifecycleKind::Exit { signal, status, code } => write!(
                f,
                "exit({}, signal={}, status={}, code={})",
                self.pid, signal, status, code
            ),
        }
    }
}

bitflags! {
    /// Subscription bits on the lifecycle bus
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EventKinds: u32 {
        const FORK = 1 << 0;
        const EXEC = 1 << 1;
        const EXIT = 1 << 2;
    }
}
