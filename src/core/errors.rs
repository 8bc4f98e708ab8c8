/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::HandleId;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// errno-style codes carried back to clients
pub mod errno {
    pub const EIO: i32 = 5;
    pub const EBADF: i32 = 9;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EINVAL: i32 = 22;
    pub const ENFILE: i32 = 23;
    pub const EMFILE: i32 = 24;
    pub const EPIPE: i32 = 32;
    pub const ENOSYS: i32 = 38;
}

/// Handle service errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum HandleError {
    #[error("Handle {0} not found")]
    #[diagnostic(
        code(handle::invalid_handle),
        help("The handle is unknown, already closed, or owned by another process.")
    )]
    InvalidHandle(HandleId),

    #[error("File not found: {0}")]
    #[diagnostic(
        code(handle::invalid_file),
        help("The file was discarded or destroyed before a handle was attached.")
    )]
    InvalidFile(String),

    #[error("Invalid flags: {0:#x}")]
    #[diagnostic(
        code(handle::invalid_flags),
        help("Only client-settable flag bits may be passed.")
    )]
    InvalidFlags(u32),

    #[error("Too many handles: {0}")]
    #[diagnostic(
        code(handle::too_many_handles),
        help("The process or the id space has no free handle slots. Close unused handles.")
    )]
    TooManyHandles(String),

    #[error("Too many open files: {0}")]
    #[diagnostic(
        code(handle::too_many_files),
        help("The provider reached its open file limit.")
    )]
    TooManyFiles(String),

    #[error("File handle list full: {0}")]
    #[diagnostic(
        code(handle::file_full),
        help("Too many handles refer to the same open file.")
    )]
    FileFull(String),

    #[error("Operation would block")]
    #[diagnostic(
        code(handle::would_block),
        help("Retry later or wait for readiness notification.")
    )]
    WouldBlock,

    #[error("Operation not supported")]
    #[diagnostic(code(handle::not_supported))]
    NotSupported,

    #[error("Provider error: {0}")]
    #[diagnostic(code(handle::provider_error))]
    Provider(String),

    #[error("Lifecycle event queue overflowed")]
    #[diagnostic(
        code(handle::lifecycle_overflow),
        help("Fork/exec/exit events were lost; descriptor tables can no longer be trusted.")
    )]
    LifecycleOverflow,

    #[error("Transport error: {0}")]
    #[diagnostic(code(handle::transport_error))]
    Transport(String),

    #[error("Internal error: {0}")]
    #[diagnostic(
        code(handle::internal_error),
        help("An unexpected internal error occurred. Please report this issue.")
    )]
    Internal(String),
}

impl HandleError {
    /// errno-style code for the reply
    pub fn errno(&self) -> i32 {
        match self {
            HandleError::InvalidHandle(_) => errno::EBADF,
            HandleError::InvalidFile(_) | HandleError::InvalidFlags(_) => errno::EINVAL,
            HandleError::TooManyHandles(_) => errno::EMFILE,
            HandleError::TooManyFiles(_) => errno::ENFILE,
            HandleError::FileFull(_) => errno::ENOMEM,
            HandleError::WouldBlock => errno::EAGAIN,
            HandleError::NotSupported => errno::ENOSYS,
            HandleError::Transport(_) => errno::EPIPE,
            HandleError::Provider(_) | HandleError::LifecycleOverflow | HandleError::Internal(_) => {
                errno::EIO
            }
        }
    }

    #[inline]
    pub fn is_would_block(&self) -> bool {
        matches!(self, HandleError::WouldBlock)
    }
}

impl From<std::io::Error> for HandleError {
    fn from(err: std::io::Error) -> Self {
        HandleError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(HandleError::InvalidHandle(3).errno(), errno::EBADF);
        assert_eq!(HandleError::InvalidFlags(0x4).errno(), errno::EINVAL);
        assert_eq!(HandleError::FileFull("f".into()).errno(), errno::ENOMEM);
        assert_eq!(HandleError::TooManyHandles("p".into()).errno(), errno::EMFILE);
        assert_eq!(HandleError::WouldBlock.errno(), errno::EAGAIN);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_string(&HandleError::InvalidHandle(7)).unwrap();
        assert_eq!(json, r#"{"error_type":"invalid_handle","details":7}"#);
    }
}
