/*!
 * Lifecycle Event Queue
 * SPSC lock-free ring between the bus handler thread and the dispatch loop
 *
 * The producer side runs on whatever thread the lifecycle bus delivers on;
 * the consumer side is drained by the dispatch loop before each request.
 * A full ring sets a sticky overflow flag that the consumer reports ahead of
 * any further event.
 */

use super::bus::LifecycleBus;
use super::event::{LifecycleEvent, LifecycleKind};
use crate::core::types::{Pid, Signal};
use crate::server::Poker;
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::error;

struct Ring {
    queue: ArrayQueue<LifecycleEvent>,
    overflow: AtomicBool,
}

/// Item handed to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drained {
    Event(LifecycleEvent),
    /// Events were lost; the consumer must not continue
    Overflow,
}

/// Create a connected producer/consumer pair
///
/// # Panics
/// Capacity must be greater than 0.
pub fn lifecycle_queue(
    capacity: usize,
    bus: Arc<dyn LifecycleBus>,
    poker: Poker,
) -> (LifecycleProducer, LifecycleConsumer) {
    assert!(capacity > 0, "Capacity must be greater than 0");
    let ring = Arc::new(Ring {
        queue: ArrayQueue::new(capacity),
        overflow: AtomicBool::new(false),
    });
    (
        LifecycleProducer {
            ring: Arc::clone(&ring),
            bus,
            poker,
        },
        LifecycleConsumer { ring },
    )
}

/// Producer half, owned by the bus handler
///
/// Not `Clone`: the ring has a single producer.
pub struct LifecycleProducer {
    ring: Arc<Ring>,
    bus: Arc<dyn LifecycleBus>,
    poker: Poker,
}

impl LifecycleProducer {
    /// Record a fork; the child is added to the bus filter immediately so
    /// none of its own events are missed
    pub fn fork(&self, parent: Pid, child: Pid) {
        self.bus.add_filter(child);
        self.push(LifecycleEvent::fork(parent, child));
    }

    pub fn exec(&self, pid: Pid) {
        self.push(LifecycleEvent::exec(pid));
    }

    pub fn exit(&self, pid: Pid, signal: Signal, status: i32, code: i32) {
        self.push(LifecycleEvent::exit(pid, signal, status, code));
    }

    /// Forward an already-built event
    pub fn publish(&self, event: LifecycleEvent) {
        match event.kind {
            LifecycleKind::Fork { child } => self.fork(event.pid, child),
            _ => self.push(event),
        }
    }

    fn push(&self, event: LifecycleEvent) {
        if let Err(lost) = self.ring.queue.push(event) {
            self.ring.overflow.store(true, Ordering::Release);
            error!(event = %lost, "Lifecycle queue full, event lost");
        }
        self.poker.wake();
    }

    /// Whether the sticky overflow flag is set
    #[inline]
    pub fn overflowed(&self) -> bool {
        self.ring.overflow.load(Ordering::Acquire)
    }
}

/// Consumer half, owned by the dispatch loop
pub struct LifecycleConsumer {
    ring: Arc<Ring>,
}

impl LifecycleConsumer {
    /// Next item; overflow is reported before any remaining event
    #[inline]
    pub fn pop(&self) -> Option<Drained> {
        if self.ring.overflow.load(Ordering::Acquire) {
            return Some(Drained::Overflow);
        }
        self.ring.queue.pop().map(Drained::Event)
    }

    /// Number of queued events (approximate)
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.queue.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.queue.capacity()
    }
}
