/*!
 * Transport
 *
 * Seam between the dispatch loop and the RPC transport:
 * - Call/reply/poke types
 * - Reply-bound confirm/rollback (`Pending`)
 * - The `Transport` trait and an in-process channel implementation
 */

mod channel;
mod pending;
mod traits;
mod types;

pub use channel::{ChannelClient, ChannelTransport};
pub use pending::{Pending, PendingState};
pub use traits::{PokeTarget, Transport};
pub use types::{Call, Delivery, Endpoint, Incoming, Poke, PollEvent, Reply, Request};
