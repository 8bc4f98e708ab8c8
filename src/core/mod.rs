/*!
 * Core Module
 * Fundamental types, limits, configuration and error handling
 */

pub mod arena;
pub mod config;
pub mod errors;
pub mod limits;
pub mod types;

// Re-export for convenience
pub use arena::{ArenaKey, GenArena};
pub use config::ServiceConfig;
pub use errors::*;
pub use types::*;
