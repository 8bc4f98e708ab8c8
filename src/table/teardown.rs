/*!
 * Client Teardown
 * Close-on-exec sweep and exit cleanup
 */

use super::client::Waiter;
use super::table::{HandleTable, Released};
use crate::core::types::{HandleId, Pid};
use tracing::debug;

/// Everything released by a sweep or teardown
#[derive(Debug)]
pub struct Teardown<T> {
    pub released: Vec<Released<T>>,
    /// Call that was parked by the client
    pub cancelled: Option<Waiter>,
}

impl<T> Teardown<T> {
    fn new() -> Self {
        Self {
            released: Vec::new(),
            cancelled: None,
        }
    }

    /// Payloads of files that lost their last handle
    pub fn closed_files(self) -> impl Iterator<Item = T> {
        self.released.into_iter().filter_map(|r| r.closed)
    }

    #[inline]
    pub fn handles_released(&self) -> usize {
        self.released.len()
    }
}

impl<T> HandleTable<T> {
    /// Close every close-on-exec handle of `pid`, shadows included
    pub fn sweep_cloexec(&mut self, pid: Pid) -> Teardown<T> {
        let mut teardown = Teardown::new();
        let Some(client) = self.clients.get_mut(&pid) else {
            return teardown;
        };
        teardown.cancelled = client.cancel_waiter();

        let doomed: Vec<HandleId> = client
            .handles
            .iter()
            .copied()
            .filter(|id| self.handles.get(id).is_some_and(|h| h.is_cloexec()))
            .collect();
        for id in doomed {
            if let Some(released) = self.release(id) {
                teardown.released.push(released);
            }
        }

        debug!(pid, closed = teardown.released.len(), "Close-on-exec sweep");
        teardown
    }

    /// Release everything `pid` owns and forget the client
    ///
    /// Pending transfers aimed at `pid` can never be claimed, so their
    /// handles are released as well.
    pub fn teardown(&mut self, pid: Pid) -> Teardown<T> {
        let mut teardown = Teardown::new();

        let orphaned: Vec<HandleId> = self
            .transfers
            .iter()
            .filter(|(_, t)| t.target == pid)
            .map(|(&id, _)| id)
            .collect();
        for id in orphaned {
            if let Some(released) = self.release(id) {
                teardown.released.push(released);
            }
        }

        if let Some(client) = self.clients.get_mut(&pid) {
            teardown.cancelled = client.cancel_waiter();
            let owned = client.handles.clone();
            for id in owned {
                if let Some(released) = self.release(id) {
                    teardown.released.push(released);
                }
            }
            self.clients.remove(&pid);
        }

        debug!(pid, released = teardown.released.len(), "Client torn down");
        teardown
    }
}
