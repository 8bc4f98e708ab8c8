/*!
 * Handle Transfers
 * Cross-process ownership handoff: `dup_to` creates, `touch` consumes
 */

use super::table::HandleTable;
use crate::core::errors::HandleError;
use crate::core::types::{HandleFlags, HandleId, HandleResult, Pid};
use tracing::debug;

/// Pending handoff of one handle, keyed by the handle id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub from: Pid,
    pub target: Pid,
}

impl<T> HandleTable<T> {
    /// Duplicate `visible` into a handle waiting for `target` to claim it
    ///
    /// Until claimed, the new handle stays owned by `pid`. The id never
    /// collides with a number the target inherited at fork.
    pub fn dup_to(&mut self, pid: Pid, visible: HandleId, target: Pid) -> HandleResult<HandleId> {
        let src = self
            .locate(pid, visible)
            .ok_or(HandleError::InvalidHandle(visible))?;
        let file = self.handles[&src].file;
        let inherited: Vec<HandleId> = self
            .clients
            .get(&target)
            .map(|c| c.translation.keys().copied().collect())
            .unwrap_or_default();
        let id = self.attach_avoiding(pid, file, HandleFlags::TRANSFER, None, &inherited)?;
        self.transfers.insert(id, Transfer { from: pid, target });
        debug!(pid, handle = id, target, "Transfer pending");
        Ok(id)
    }

    /// Claim a transferred handle; only the first claim by the target wins
    ///
    /// A claim that would hide a number the target inherited after the
    /// transfer was created is refused; the sender still owns the handle.
    pub fn touch(&mut self, pid: Pid, id: HandleId) -> HandleResult<()> {
        let transfer = match self.transfers.get(&id) {
            Some(t) if t.target == pid => *t,
            _ => return Err(HandleError::InvalidHandle(id)),
        };
        if self
            .clients
            .get(&pid)
            .is_some_and(|c| c.translation.contains_key(&id))
        {
            debug!(pid, handle = id, "Claim would alias an inherited number");
            return Err(HandleError::InvalidHandle(id));
        }

        let max_per_client = self.max_handles_per_client();
        let target = self.ensure_client(pid);
        if transfer.from != pid && target.handles.len() >= max_per_client {
            return Err(HandleError::TooManyHandles(format!(
                "pid {} owns {} handles",
                pid,
                target.handles.len()
            )));
        }

        self.transfers.remove(&id);
        let old_slot = match self.handles.get(&id) {
            Some(h) => h.client_slot,
            None => return Err(HandleError::InvalidHandle(id)),
        };

        if let Some(from) = self.clients.get_mut(&transfer.from) {
            if let Some(moved) = from.detach(old_slot) {
                if let Some(h) = self.handles.get_mut(&moved) {
                    h.client_slot = old_slot;
                }
            }
        }
        let new_slot = self.ensure_client(pid).attach(id);
        if let Some(h) = self.handles.get_mut(&id) {
            h.owner = pid;
            h.client_slot = new_slot;
            h.flags.remove(HandleFlags::TRANSFER);
        }

        debug!(from = transfer.from, pid, handle = id, "Transfer claimed");
        Ok(())
    }

    /// Pending transfer record for a handle
    #[inline]
    pub fn transfer(&self, id: HandleId) -> Option<&Transfer> {
        self.transfers.get(&id)
    }
}
