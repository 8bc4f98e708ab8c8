/*!
 * Handle/File Table
 *
 * - **Files**: open file descriptions in a generation-checked arena
 * - **Handles**: per-process references numbered from one shared id arena
 * - **Clients**: per-process handle lists and fork translation tables
 * - **Transfers**: pending cross-process handoffs
 */

mod client;
mod file;
mod handle;
mod ids;
mod table;
mod teardown;
mod transfer;

pub use client::{Client, WaitMode, Waiter};
pub use file::{File, FileId};
pub use handle::Handle;
pub use ids::IdArena;
pub use table::{HandleTable, Released, TableStats};
pub use teardown::Teardown;
pub use transfer::Transfer;
