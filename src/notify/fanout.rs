/*!
 * Readiness Fan-out
 * Interest bookkeeping and the per-file wakeup scan
 */

use crate::core::errors::HandleError;
use crate::core::types::{EventMask, HandleId, HandleResult, Pid, Trigger};
use crate::table::{FileId, HandleTable, WaitMode, Waiter};
use crate::transport::{Call, Endpoint, PollEvent};
use tracing::debug;

/// Work produced by one `notify` on a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wakeup {
    /// Readiness event for a relayed client
    Push { relay: Endpoint, event: PollEvent },
    /// A parked call to dispatch again
    Unblock(Waiter),
}

/// Bits a waiter is always woken for, in addition to what it asked for
const ALWAYS_WAKE: EventMask = EventMask::HANGUP.union(EventMask::ERROR);

impl<T> HandleTable<T> {
    /// Record interest on the handle `pid` knows as `visible`
    ///
    /// A non-empty mask moves the client to notify mode; a call it had parked
    /// is handed back so it can be dispatched again. An empty mask clears the
    /// interest and leaves the mode alone.
    pub fn set_interest(
        &mut self,
        pid: Pid,
        visible: HandleId,
        mask: EventMask,
        trigger: Trigger,
        relay: Endpoint,
    ) -> HandleResult<(FileId, Option<Waiter>)> {
        let id = self
            .locate(pid, visible)
            .ok_or(HandleError::InvalidHandle(visible))?;
        let handle = self
            .handle_mut(id)
            .ok_or(HandleError::InvalidHandle(visible))?;
        let file = handle.file;

        if mask.is_empty() {
            handle.interest = EventMask::empty();
            handle.trigger = Trigger::Level;
            debug!(pid, handle = visible, "Cleared interest");
            return Ok((file, None));
        }
        handle.interest = mask;
        handle.trigger = trigger;

        let client = self.ensure_client(pid);
        let parked = client.cancel_waiter();
        client.mode = WaitMode::Notify { relay };
        debug!(pid, handle = visible, ?mask, ?trigger, %relay, "Recorded interest");
        Ok((file, parked))
    }

    /// Park `call` as the client's single blocker on real handle `handle`
    ///
    /// Fails with `WouldBlock` when the client relays events or already has
    /// a parked call.
    pub fn park(
        &mut self,
        pid: Pid,
        handle: HandleId,
        wanted: EventMask,
        call: Call,
    ) -> HandleResult<()> {
        let client = self.ensure_client(pid);
        if !matches!(client.mode, WaitMode::Idle) {
            return Err(HandleError::WouldBlock);
        }
        client.mode = WaitMode::Blocked(Waiter { handle, wanted, call });
        debug!(pid, handle, ?wanted, "Parked call");
        Ok(())
    }

    /// Scan every handle on `file` for relay pushes and blockers to wake
    ///
    /// Every relayed handle whose interest meets `mask` gets a push, whatever
    /// its trigger; the trigger only tells the relay whether to re-read
    /// readiness with `Poll` or to wait for the next push. Each woken blocker
    /// leaves blocking state.
    pub fn collect_wakeups(&mut self, file: FileId, mask: EventMask) -> Vec<Wakeup> {
        let Some(f) = self.files.get(file) else {
            return Vec::new();
        };
        let mut wakeups = Vec::new();

        for &id in f.handles() {
            let Some(handle) = self.handles.get(&id) else {
                continue;
            };
            let Some(client) = self.clients.get_mut(&handle.owner) else {
                continue;
            };

            match &client.mode {
                WaitMode::Notify { relay } => {
                    let interest = handle.interest | EventMask::HANGUP;
                    if !handle.interest.is_empty() && interest.intersects(mask) {
                        wakeups.push(Wakeup::Push {
                            relay: *relay,
                            event: PollEvent {
                                handle: handle.visible_id(),
                                events: mask & interest,
                            },
                        });
                    }
                }
                WaitMode::Blocked(waiter) if waiter.handle == id => {
                    let wake = (waiter.wanted | ALWAYS_WAKE).intersects(mask);
                    if wake {
                        if let Some(waiter) = client.cancel_waiter() {
                            wakeups.push(Wakeup::Unblock(waiter));
                        }
                    }
                }
                _ => {}
            }
        }
        wakeups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ServiceConfig;
    use crate::core::types::FileFlags;
    use crate::transport::Request;

    fn call(pid: Pid, handle: HandleId) -> Call {
        Call::new(pid, Endpoint(10), Request::Read { handle, len: 4 })
    }

    #[test]
    fn test_level_interest_pushes_too() {
        let mut t: HandleTable<()> = HandleTable::new(&ServiceConfig::default());
        let file = t.new_file(FileFlags::empty(), ()).unwrap();
        let h = t.add_handle(1, file, 0).unwrap();
        t.set_interest(1, h, EventMask::READABLE, Trigger::Level, Endpoint(5))
            .unwrap();

        assert_eq!(
            t.collect_wakeups(file, EventMask::READABLE | EventMask::WRITABLE),
            vec![Wakeup::Push {
                relay: Endpoint(5),
                event: PollEvent {
                    handle: h,
                    events: EventMask::READABLE
                },
            }]
        );
        assert!(t.collect_wakeups(file, EventMask::WRITABLE).is_empty());
    }

    #[test]
    fn test_push_only_to_interested() {
        let mut t: HandleTable<()> = HandleTable::new(&ServiceConfig::default());
        let file = t.new_file(FileFlags::empty(), ()).unwrap();
        let a = t.add_handle(1, file, 0).unwrap();
        t.add_handle(2, file, 0).unwrap();
        t.set_interest(1, a, EventMask::READABLE, Trigger::Edge, Endpoint(5))
            .unwrap();

        let wakeups = t.collect_wakeups(file, EventMask::READABLE);
        assert_eq!(
            wakeups,
            vec![Wakeup::Push {
                relay: Endpoint(5),
                event: PollEvent {
                    handle: a,
                    events: EventMask::READABLE
                },
            }]
        );
        assert!(t.collect_wakeups(file, EventMask::WRITABLE).is_empty());
    }

    #[test]
    fn test_blocker_woken_once_and_on_hangup() {
        let mut t: HandleTable<()> = HandleTable::new(&ServiceConfig::default());
        let file = t.new_file(FileFlags::empty(), ()).unwrap();
        let h = t.add_handle(1, file, 0).unwrap();
        t.park(1, h, EventMask::READABLE, call(1, h)).unwrap();

        // Second park while blocked
        assert_eq!(
            t.park(1, h, EventMask::READABLE, call(1, h)),
            Err(HandleError::WouldBlock)
        );
        assert!(t.collect_wakeups(file, EventMask::WRITABLE).is_empty());

        let wakeups = t.collect_wakeups(file, EventMask::HANGUP);
        assert!(matches!(&wakeups[..], [Wakeup::Unblock(w)] if w.handle == h));
        assert!(t.collect_wakeups(file, EventMask::HANGUP).is_empty());
    }

    #[test]
    fn test_switch_to_notify_returns_blocker() {
        let mut t: HandleTable<()> = HandleTable::new(&ServiceConfig::default());
        let file = t.new_file(FileFlags::empty(), ()).unwrap();
        let h = t.add_handle(1, file, 0).unwrap();
        t.park(1, h, EventMask::READABLE, call(1, h)).unwrap();

        let (_, parked) = t
            .set_interest(1, h, EventMask::READABLE, Trigger::Edge, Endpoint(5))
            .unwrap();
        assert_eq!(parked.map(|w| w.call), Some(call(1, h)));
        assert_eq!(
            t.client(1).unwrap().mode(),
            &WaitMode::Notify { relay: Endpoint(5) }
        );
    }
}
