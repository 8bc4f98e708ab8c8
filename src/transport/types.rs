/*!
 * Transport Types
 * Calls, replies and pokes exchanged with the RPC transport
 */

use crate::core::errors::HandleError;
use crate::core::types::{EventMask, HandleId, Pid, Trigger};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reply endpoint of an in-flight call, or a client's event relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(pub u64);

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ep{}", self.0)
    }
}

/// Handle-bearing requests understood by the dispatch loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Ask the provider to open a new file and attach a handle to it
    Open { flags: u32, arg: Vec<u8> },
    Read { handle: HandleId, len: usize },
    Write { handle: HandleId, data: Vec<u8> },
    Ioctl { handle: HandleId, cmd: u32, arg: Vec<u8> },
    Close { handle: HandleId },
    Dup { handle: HandleId },
    /// Duplicate into a pending transfer towards `target`
    DupTo { handle: HandleId, target: Pid },
    /// Claim a handle transferred to the caller
    Touch { handle: HandleId },
    GetHandleFlags { handle: HandleId },
    SetHandleFlags { handle: HandleId, flags: u32 },
    GetStatusFlags { handle: HandleId },
    SetStatusFlags { handle: HandleId, flags: u32 },
    SetNotify {
        handle: HandleId,
        mask: EventMask,
        trigger: Trigger,
        relay: Endpoint,
    },
    /// Level-triggered readiness query
    Poll { handle: HandleId, mask: EventMask },
}

impl Request {
    /// Handle the request targets, if any
    pub fn handle(&self) -> Option<HandleId> {
        match self {
            Request::Open { .. } => None,
            Request::Read { handle, .. }
            | Request::Write { handle, .. }
            | Request::Ioctl { handle, .. }
            | Request::Close { handle }
            | Request::Dup { handle }
            | Request::DupTo { handle, .. }
            | Request::Touch { handle }
            | Request::GetHandleFlags { handle }
            | Request::SetHandleFlags { handle, .. }
            | Request::GetStatusFlags { handle }
            | Request::SetStatusFlags { handle, .. }
            | Request::SetNotify { handle, .. }
            | Request::Poll { handle, .. } => Some(*handle),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Request::Open { .. } => "open",
            Request::Read { .. } => "read",
            Request::Write { .. } => "write",
            Request::Ioctl { .. } => "ioctl",
            Request::Close { .. } => "close",
            Request::Dup { .. } => "dup",
            Request::DupTo { .. } => "dup_to",
            Request::Touch { .. } => "touch",
            Request::GetHandleFlags { .. } => "get_handle_flags",
            Request::SetHandleFlags { .. } => "set_handle_flags",
            Request::GetStatusFlags { .. } => "get_status_flags",
            Request::SetStatusFlags { .. } => "set_status_flags",
            Request::SetNotify { .. } => "set_notify",
            Request::Poll { .. } => "poll",
        }
    }
}

/// One call from a client process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub caller: Pid,
    pub endpoint: Endpoint,
    pub request: Request,
}

impl Call {
    pub fn new(caller: Pid, endpoint: Endpoint, request: Request) -> Self {
        Self {
            caller,
            endpoint,
            request,
        }
    }
}

/// Reply payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Reply {
    Data(Vec<u8>),
    Count(usize),
    Handle(HandleId),
    Flags(u32),
    Status(EventMask),
    Done,
    Error(HandleError),
}

impl Reply {
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

impl From<HandleError> for Reply {
    fn from(err: HandleError) -> Self {
        Reply::Error(err)
    }
}

/// Readiness push delivered to a client's relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollEvent {
    /// Handle number as the client knows it
    pub handle: HandleId,
    pub events: EventMask,
}

/// Fate of a reply or push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Reached the caller
    Delivered,
    /// Transmission demonstrably failed
    Failed,
}

impl Delivery {
    #[inline]
    pub fn is_delivered(self) -> bool {
        self == Delivery::Delivered
    }
}

/// Internal signal carried by the helper thread into the dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Poke {
    /// Lifecycle events are queued
    Wake,
    /// Leave the dispatch loop with this status
    Shutdown(i32),
}

/// What the dispatch loop receives next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Call(Call),
    Poke(Poke),
}

