/*!
 * Helper Thread
 *
 * Turns internally posted pokes into deliveries on the transport so the
 * dispatch loop, blocked in `receive`, wakes up in order with real calls.
 * Holds no table state. One helper runs per `serve` call and is stopped
 * before `serve` returns; pokes posted in between wait in the channel.
 */

use crate::transport::{Poke, PokeTarget};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

static NEXT_HELPER: AtomicU64 = AtomicU64::new(1);

/// What travels on the poke channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Poke(Poke),
    /// Stop the helper with this id; other helpers skip it
    Stop(u64),
}

/// Posts pokes to the helper thread
///
/// Wake pokes coalesce: at most one is outstanding until the dispatch loop
/// receives it and calls [`Poker::rearm`].
#[derive(Clone)]
pub struct Poker {
    sender: flume::Sender<Signal>,
    wake_pending: Arc<AtomicBool>,
}

impl Poker {
    /// Poker plus the receiving end for [`Helper::spawn`]
    pub(crate) fn channel() -> (Self, flume::Receiver<Signal>) {
        let (sender, receiver) = flume::unbounded();
        (
            Self {
                sender,
                wake_pending: Arc::new(AtomicBool::new(false)),
            },
            receiver,
        )
    }

    /// Poker whose pokes go nowhere
    pub fn detached() -> Self {
        Self::channel().0
    }

    /// Ask the dispatch loop to run another iteration
    pub fn wake(&self) {
        if self.wake_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.sender.send(Signal::Poke(Poke::Wake)).is_err() {
            debug!("Wake poke dropped, helper not running");
        }
    }

    /// Ask the dispatch loop to return `status`
    pub fn shutdown(&self, status: i32) {
        if self.sender.send(Signal::Poke(Poke::Shutdown(status))).is_err() {
            debug!(status, "Shutdown poke dropped, helper not running");
        }
    }

    /// Allow the next wake to be posted
    #[inline]
    pub fn rearm(&self) {
        self.wake_pending.store(false, Ordering::Release);
    }
}

/// The auxiliary thread forwarding pokes
pub struct Helper {
    id: u64,
    control: flume::Sender<Signal>,
    handle: JoinHandle<()>,
}

impl Helper {
    /// Start forwarding what `poker` posts to `target`
    pub(crate) fn spawn(
        poker: &Poker,
        signals: flume::Receiver<Signal>,
        target: Box<dyn PokeTarget>,
    ) -> std::io::Result<Self> {
        let id = NEXT_HELPER.fetch_add(1, Ordering::Relaxed);
        let handle = thread::Builder::new()
            .name("handle-helper".into())
            .spawn(move || {
                while let Ok(signal) = signals.recv() {
                    let poke = match signal {
                        Signal::Poke(poke) => poke,
                        Signal::Stop(stop) if stop == id => break,
                        Signal::Stop(_) => continue,
                    };
                    if let Err(e) = target.deliver(poke) {
                        warn!(error = %e, ?poke, "Helper could not deliver poke");
                        break;
                    }
                    if matches!(poke, Poke::Shutdown(_)) {
                        break;
                    }
                }
                debug!(helper = id, "Helper thread exiting");
            })?;
        Ok(Self {
            id,
            control: poker.sender.clone(),
            handle,
        })
    }

    /// Stop the thread, if it is still running, and wait for it
    pub fn stop(self) {
        if !self.handle.is_finished() && self.control.send(Signal::Stop(self.id)).is_err() {
            debug!(helper = self.id, "Poke channel closed");
        }
        if self.handle.join().is_err() {
            warn!("Helper thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::HandleResult;
    use parking_lot::Mutex;

    struct Recorder(Arc<Mutex<Vec<Poke>>>);

    impl PokeTarget for Recorder {
        fn deliver(&self, poke: Poke) -> HandleResult<()> {
            self.0.lock().push(poke);
            Ok(())
        }
    }

    #[test]
    fn test_wake_coalesces_until_rearmed() {
        let (poker, rx) = Poker::channel();
        poker.wake();
        poker.wake();
        assert_eq!(rx.len(), 1);

        poker.rearm();
        poker.wake();
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn test_helper_forwards_until_shutdown() {
        let (poker, rx) = Poker::channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let helper = Helper::spawn(&poker, rx, Box::new(Recorder(Arc::clone(&seen)))).unwrap();

        poker.wake();
        poker.shutdown(3);
        helper.stop();

        assert_eq!(*seen.lock(), vec![Poke::Wake, Poke::Shutdown(3)]);
    }

    #[test]
    fn test_stopped_helper_leaves_pokes_for_the_next() {
        let (poker, rx) = Poker::channel();
        let first = Arc::new(Mutex::new(Vec::new()));
        let helper =
            Helper::spawn(&poker, rx.clone(), Box::new(Recorder(Arc::clone(&first)))).unwrap();
        helper.stop();

        poker.shutdown(1);
        let second = Arc::new(Mutex::new(Vec::new()));
        let helper = Helper::spawn(&poker, rx, Box::new(Recorder(Arc::clone(&second)))).unwrap();
        poker.shutdown(2);
        helper.stop();

        assert!(first.lock().is_empty());
        assert_eq!(*second.lock(), vec![Poke::Shutdown(1)]);
    }
}
