/*!
 * Server
 *
 * The provider-facing service and its single-threaded dispatch loop, plus
 * the helper thread that carries pokes into it.
 */

mod dispatch;
mod helper;
mod provider;
mod service;

pub use helper::{Helper, Poker};
pub use provider::{IoContext, Provider};
pub use service::{HandleService, ServiceBuilder};
