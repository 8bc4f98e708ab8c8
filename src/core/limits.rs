/*!
 * System Limits and Constants
 *
 * Centralized location for handle service limits and defaults.
 * Organized by domain for maintainability and discoverability.
 */

// =============================================================================
// HANDLE TABLE LIMITS
// =============================================================================

/// First id handed out by the handle id arena
pub const FIRST_HANDLE_ID: u32 = 0;

/// Exclusive upper bound of server-wide handle ids; ids run from
/// `FIRST_HANDLE_ID` up to but not including this
pub const MAX_HANDLE_IDS: u32 = 1 << 20;

/// Standard handle limit per client process
/// [LINUX-COMPAT] Matches the usual RLIMIT_NOFILE soft limit
pub const MAX_HANDLES_PER_CLIENT: usize = 1024;

/// Maximum number of handles referring to one open file
pub const MAX_HANDLES_PER_FILE: usize = u16::MAX as usize;

/// Maximum number of open files per provider
pub const MAX_FILES: usize = 1 << 16;

// =============================================================================
// LIFECYCLE LIMITS
// =============================================================================

/// Lifecycle event ring capacity
/// Sized for fork bursts between two dispatch iterations
pub const LIFECYCLE_QUEUE_CAPACITY: usize = 256;
