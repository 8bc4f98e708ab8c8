/*!
 * Lifecycle Bus
 * Subscription seam to the process lifecycle broadcast, plus an in-process bus
 */

use super::event::{EventKinds, LifecycleEvent, LifecycleKind};
use super::queue::LifecycleProducer;
use crate::core::types::Pid;
use ahash::HashSet;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Pub/sub bus broadcasting fork/exec/exit
pub trait LifecycleBus: Send + Sync {
    /// Subscribe to the given event kinds
    fn subscribe(&self, kinds: EventKinds);

    /// Start delivering events that originate from `pid`
    fn add_filter(&self, pid: Pid);

    /// Stop delivering events that originate from `pid`
    fn remove_filter(&self, pid: Pid);
}

/// Bus that delivers nothing
pub struct NullBus;

impl LifecycleBus for NullBus {
    fn subscribe(&self, _kinds: EventKinds) {}
    fn add_filter(&self, _pid: Pid) {}
    fn remove_filter(&self, _pid: Pid) {}
}

#[derive(Default)]
struct Filters {
    kinds: AtomicU32,
    pids: RwLock<HashSet<Pid>>,
}

impl LifecycleBus for Filters {
    fn subscribe(&self, kinds: EventKinds) {
        self.kinds.fetch_or(kinds.bits(), Ordering::AcqRel);
    }

    fn add_filter(&self, pid: Pid) {
        self.pids.write().insert(pid);
    }

    fn remove_filter(&self, pid: Pid) {
        self.pids.write().remove(&pid);
    }
}

/// In-process bus: filters published events by kind and pid and feeds an
/// attached producer
pub struct LocalBus {
    filters: Arc<Filters>,
    producer: Mutex<Option<LifecycleProducer>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self {
            filters: Arc::new(Filters::default()),
            producer: Mutex::new(None),
        }
    }

    /// Subscription handle to give to the service
    pub fn handle(&self) -> Arc<dyn LifecycleBus> {
        self.filters.clone()
    }

    /// Connect the service's producer half
    pub fn attach(&self, producer: LifecycleProducer) {
        *self.producer.lock() = Some(producer);
    }

    /// Whether events from `pid` would be delivered
    pub fn is_watching(&self, pid: Pid) -> bool {
        self.filters.pids.read().contains(&pid)
    }

    /// Broadcast an event; returns whether it was delivered
    pub fn publish(&self, event: LifecycleEvent) -> bool {
        let kinds = EventKinds::from_bits_truncate(self.filters.kinds.load(Ordering::Acquire));
        if !kinds.intersects(event.kinds()) || !self.is_watching(event.pid) {
            debug!(%event, "Lifecycle event filtered out");
            return false;
        }

        let guard = self.producer.lock();
        let Some(producer) = guard.as_ref() else {
            return false;
        };
        producer.publish(event);
        true
    }

    pub fn fork(&self, parent: Pid, child: Pid) -> bool {
        self.publish(LifecycleEvent::fork(parent, child))
    }

    pub fn exec(&self, pid: Pid) -> bool {
        self.publish(LifecycleEvent::exec(pid))
    }

    pub fn exit(&self, pid: Pid, signal: u32, status: i32, code: i32) -> bool {
        self.publish(LifecycleEvent {
            pid,
            kind: LifecycleKind::Exit {
                signal,
                status,
                code,
            },
        })
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::queue::{lifecycle_queue, Drained};
    use crate::server::Poker;

    #[test]
    fn test_filters_by_pid_and_kind() {
        let bus = LocalBus::new();
        let (producer, consumer) = lifecycle_queue(8, bus.handle(), Poker::detached());
        bus.attach(producer);

        // Not subscribed yet
        bus.handle().add_filter(1);
        assert!(!bus.exec(1));

        bus.handle().subscribe(EventKinds::all());
        assert!(bus.exec(1));
        assert!(!bus.exec(2));
        assert_eq!(consumer.pop(), Some(Drained::Event(LifecycleEvent::exec(1))));
    }

    #[test]
    fn test_fork_watches_child() {
        let bus = LocalBus::new();
        let (producer, _consumer) = lifecycle_queue(8, bus.handle(), Poker::detached());
        bus.attach(producer);
        bus.handle().subscribe(EventKinds::all());
        bus.handle().add_filter(1);

        assert!(bus.fork(1, 2));
        assert!(bus.is_watching(2));
        assert!(bus.exit(2, 9, 0, 0));
    }
}
