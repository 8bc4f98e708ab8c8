/*!
 * Core Types
 * Common types used across the handle service
 */

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Process ID type
pub type Pid = u32;

/// Handle identifier, drawn from the server-wide id arena
pub type HandleId = u32;

/// Signal number carried by exit events
pub type Signal = u32;

/// Common result type for handle operations
pub type HandleResult<T> = Result<T, super::errors::HandleError>;

bitflags! {
    /// Open file description status flags, shared by every duplicate
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FileFlags: u32 {
        const NONBLOCK = 1 << 0;
    }
}

bitflags! {
    /// Per-handle flags
    ///
    /// Only `CLOEXEC` may be set by clients; `SHADOW` and `TRANSFER` are
    /// maintained by fork replication and `dup_to` respectively.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct HandleFlags: u32 {
        const CLOEXEC = 1 << 0;
        const SHADOW = 1 << 1;
        const TRANSFER = 1 << 2;
    }
}

impl HandleFlags {
    /// Flags a client is allowed to pass to `add_handle` or set later
    pub const CLIENT_MASK: HandleFlags = HandleFlags::CLOEXEC;

    /// Parse client-supplied flag bits, rejecting anything internal or unknown
    pub fn from_client(bits: u32) -> Option<HandleFlags> {
        HandleFlags::from_bits(bits).filter(|flags| Self::CLIENT_MASK.contains(*flags))
    }
}

bitflags! {
    /// Readiness bits, epoll-compatible values
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EventMask: u32 {
        const READABLE = 0x001;
        const PRIORITY = 0x002;
        const WRITABLE = 0x004;
        const ERROR = 0x008;
        const HANGUP = 0x010;
    }
}

bitflags! {
    /// Operations a provider wants confirmed eagerly instead of on the next
    /// dispatch iteration
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FastConfirm: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const CLOSE = 1 << 2;
    }
}

/// Notification trigger mode for an interest record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Each push means "re-read readiness"; the relay keeps reporting the
    /// handle while `Poll` says it is ready
    #[default]
    Level,
    /// Each push is reported once; the relay waits for the next push
    Edge,
}

/// Byte-moving operation whose count is committed on confirm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoOp {
    Read,
    Write,
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoOp::Read => write!(f, "read"),
            IoOp::Write => write!(f, "write"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_flags_reject_internal_bits() {
        assert_eq!(HandleFlags::from_client(0), Some(HandleFlags::empty()));
        assert_eq!(HandleFlags::from_client(1), Some(HandleFlags::CLOEXEC));
        assert_eq!(HandleFlags::from_client(HandleFlags::SHADOW.bits()), None);
        assert_eq!(HandleFlags::from_client(0x80), None);
    }
}
