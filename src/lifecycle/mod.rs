/*!
 * Process Lifecycle
 *
 * Fork, exec and exit events reach the service from the lifecycle bus through
 * a lock-free ring, and are applied to the handle table between requests:
 * - **Fork**: shadow-replicate the parent's handles into the child
 * - **Exec**: close close-on-exec handles, cancel a parked call
 * - **Exit**: release everything the process owns or was sent
 */

mod apply;
mod bus;
mod event;
mod fork;
mod queue;

pub use bus::{LifecycleBus, LocalBus, NullBus};
pub use event::{EventKinds, LifecycleEvent, LifecycleKind};
pub use queue::{lifecycle_queue, Drained, LifecycleConsumer, LifecycleProducer};
