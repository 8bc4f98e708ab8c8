/*!
 * Transport Traits
 * Shape of the synchronous call/reply transport the dispatch loop runs on
 */

use super::types::{Delivery, Endpoint, Incoming, Poke, PollEvent, Reply};
use crate::core::types::HandleResult;

/// Synchronous call/reply RPC transport
pub trait Transport {
    /// Block until the next call or internal poke arrives
    fn receive(&mut self) -> HandleResult<Incoming>;

    /// Answer a call; reports whether the reply reached the caller
    fn reply(&mut self, endpoint: Endpoint, reply: Reply) -> Delivery;

    /// Push a readiness event to a client's relay
    fn push_event(&mut self, relay: Endpoint, event: PollEvent) -> Delivery;

    /// Whether a parked endpoint can still be answered
    fn is_live(&self, _endpoint: Endpoint) -> bool {
        true
    }

    /// Forget a parked endpoint that will never be answered
    fn abandon(&mut self, _endpoint: Endpoint) {}

    /// Sink the helper thread uses to feed pokes into `receive`
    fn poke_target(&self) -> Box<dyn PokeTarget>;
}

/// Cross-thread entry for pokes
pub trait PokeTarget: Send + 'static {
    fn deliver(&self, poke: Poke) -> HandleResult<()>;
}
