/*!
 * Handle/File Table
 *
 * Owns files, handles and clients, and the primitive create, duplicate and
 * destroy operations on them.
 *
 * # Invariants
 *
 * - A handle appears in exactly one client's handle list and one file's
 *   handle list, at the slots it records.
 * - A file is removed, and its payload handed back for closing, exactly when
 *   its last handle detaches.
 * - A shadow handle is reachable only through its owner's translation table.
 */

use super::client::{Client, WaitMode, Waiter};
use super::file::{File, FileId};
use super::handle::Handle;
use super::ids::IdArena;
use super::transfer::Transfer;
use crate::core::arena::GenArena;
use crate::core::config::ServiceConfig;
use crate::core::errors::HandleError;
use crate::core::types::{EventMask, FileFlags, HandleFlags, HandleId, HandleResult, Pid, Trigger};
use ahash::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Outcome of detaching one handle
#[derive(Debug)]
pub struct Released<T> {
    pub handle: Handle,
    /// Payload of the file, when this was its last handle
    pub closed: Option<T>,
    /// Call that was parked on the handle
    pub cancelled: Option<Waiter>,
}

/// Table occupancy snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub files: usize,
    pub handles: usize,
    pub clients: usize,
    pub transfers: usize,
}

/// Per-provider descriptor bookkeeping
pub struct HandleTable<T> {
    pub(crate) files: GenArena<File<T>>,
    pub(crate) handles: HashMap<HandleId, Handle>,
    pub(crate) clients: HashMap<Pid, Client>,
    pub(crate) transfers: HashMap<HandleId, Transfer>,
    pub(crate) ids: IdArena,
    max_per_client: usize,
    max_per_file: usize,
}

impl<T> HandleTable<T> {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            files: GenArena::with_capacity(config.max_files),
            handles: HashMap::default(),
            clients: HashMap::default(),
            transfers: HashMap::default(),
            ids: IdArena::new(config.first_handle_id, config.max_handle_ids),
            max_per_client: config.max_handles_per_client,
            max_per_file: config.max_handles_per_file,
        }
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// First phase of file creation; commit with `add_handle` or undo with
    /// `discard_file`
    pub fn new_file(&mut self, flags: FileFlags, payload: T) -> HandleResult<FileId> {
        self.files.insert(File::new(flags, payload)).map_err(|_| {
            HandleError::TooManyFiles(format!("{} files open", self.files.len()))
        })
    }

    /// Undo `new_file`
    ///
    /// Returns the payload of an uncommitted file. No-op for `None`, stale
    /// ids, and files that already have handles.
    pub fn discard_file(&mut self, file: Option<FileId>) -> Option<T> {
        let file = file?;
        if self.files.get(file)?.is_committed() {
            return None;
        }
        self.files.remove(file).map(|f| f.payload)
    }

    #[inline]
    pub fn file(&self, file: FileId) -> Option<&File<T>> {
        self.files.get(file)
    }

    #[inline]
    pub fn file_mut(&mut self, file: FileId) -> Option<&mut File<T>> {
        self.files.get_mut(file)
    }

    // ------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------

    #[inline]
    pub fn client(&self, pid: Pid) -> Option<&Client> {
        self.clients.get(&pid)
    }

    #[inline]
    pub fn has_client(&self, pid: Pid) -> bool {
        self.clients.contains_key(&pid)
    }

    #[inline]
    pub(crate) fn max_handles_per_client(&self) -> usize {
        self.max_per_client
    }

    pub(crate) fn ensure_client(&mut self, pid: Pid) -> &mut Client {
        self.clients.entry(pid).or_insert_with(|| {
            debug!(pid, "Created client");
            Client::new(pid)
        })
    }

    // ------------------------------------------------------------------
    // Handles
    // ------------------------------------------------------------------

    /// Attach a new handle for `pid` to `file`
    ///
    /// # Errors
    ///
    /// - `InvalidFlags` / `InvalidFile` (EINVAL)
    /// - `FileFull` (ENOMEM) when the file's handle list is full
    /// - `TooManyHandles` (EMFILE) when the client or the id space is full
    pub fn add_handle(&mut self, pid: Pid, file: FileId, flags: u32) -> HandleResult<HandleId> {
        let flags = HandleFlags::from_client(flags).ok_or(HandleError::InvalidFlags(flags))?;
        self.attach(pid, file, flags, None)
    }

    /// Link a handle into both back-reference lists
    ///
    /// Shadows pass the number their owner knows them by as `alias`.
    pub(crate) fn attach(
        &mut self,
        pid: Pid,
        file: FileId,
        flags: HandleFlags,
        alias: Option<HandleId>,
    ) -> HandleResult<HandleId> {
        self.attach_avoiding(pid, file, flags, alias, &[])
    }

    /// `attach`, additionally never handing out any id in `avoid`
    pub(crate) fn attach_avoiding(
        &mut self,
        pid: Pid,
        file: FileId,
        flags: HandleFlags,
        alias: Option<HandleId>,
        avoid: &[HandleId],
    ) -> HandleResult<HandleId> {
        let max_per_file = self.max_per_file;
        let max_per_client = self.max_per_client;

        let Some(f) = self.files.get_mut(file) else {
            return Err(HandleError::InvalidFile(file.to_string()));
        };
        if f.handles.len() >= max_per_file {
            return Err(HandleError::FileFull(format!(
                "file {} has {} handles",
                file,
                f.handles.len()
            )));
        }

        let client = self.clients.entry(pid).or_insert_with(|| Client::new(pid));
        if client.handles.len() >= max_per_client {
            return Err(HandleError::TooManyHandles(format!(
                "pid {} owns {} handles",
                pid,
                client.handles.len()
            )));
        }

        let id = allocate_id(&mut self.ids, client, avoid)?;
        let file_slot = f.attach(id);
        let client_slot = client.attach(id);
        if let Some(visible) = alias {
            if let Some(stale) = client.translation.insert(visible, id) {
                warn!(pid, visible, stale, "Replaced translation entry");
            }
        }

        self.handles.insert(
            id,
            Handle {
                id,
                owner: pid,
                file,
                flags,
                interest: EventMask::empty(),
                trigger: Trigger::Level,
                alias,
                client_slot,
                file_slot,
            },
        );
        debug!(pid, handle = id, %file, ?flags, "Attached handle");
        Ok(id)
    }

    /// Detach a handle from every structure that references it
    pub(crate) fn release(&mut self, id: HandleId) -> Option<Released<T>> {
        let handle = self.handles.remove(&id)?;
        self.ids.release(id);
        self.transfers.remove(&id);

        let mut cancelled = None;
        if let Some(client) = self.clients.get_mut(&handle.owner) {
            if let Some(moved) = client.detach(handle.client_slot) {
                if let Some(h) = self.handles.get_mut(&moved) {
                    h.client_slot = handle.client_slot;
                }
            }
            if let Some(visible) = handle.alias {
                if client.translate(visible) == Some(id) {
                    client.translation.remove(&visible);
                }
            }
            if matches!(&client.mode, WaitMode::Blocked(w) if w.handle == id) {
                cancelled = client.cancel_waiter();
            }
        }

        let mut closed = None;
        if let Some(file) = self.files.get_mut(handle.file) {
            if let Some(moved) = file.detach(handle.file_slot) {
                if let Some(h) = self.handles.get_mut(&moved) {
                    h.file_slot = handle.file_slot;
                }
            }
            if file.handles.is_empty() {
                closed = self.files.remove(handle.file).map(|f| f.payload);
            }
        }

        debug!(
            pid = handle.owner,
            handle = id,
            file_closed = closed.is_some(),
            "Released handle"
        );
        Some(Released {
            handle,
            closed,
            cancelled,
        })
    }

    /// Real handle behind a number `pid` uses: direct ownership first, then
    /// the client's translation table
    pub fn locate(&self, pid: Pid, visible: HandleId) -> Option<HandleId> {
        if let Some(h) = self.handles.get(&visible) {
            if h.owner == pid && !h.is_shadow() {
                return Some(visible);
            }
        }
        self.clients.get(&pid)?.translate(visible)
    }

    /// Direct lookup; shadows and foreign handles fail closed
    pub fn resolve(&self, pid: Pid, id: HandleId) -> Option<&Handle> {
        self.handles
            .get(&id)
            .filter(|h| h.owner == pid && !h.is_shadow())
    }

    /// File behind a number `pid` uses, shadows included
    pub fn get_file(&self, pid: Pid, id: HandleId) -> Option<FileId> {
        let real = self.locate(pid, id)?;
        self.handles.get(&real).map(|h| h.file)
    }

    /// Raw handle record by real id
    #[inline]
    pub fn handle(&self, id: HandleId) -> Option<&Handle> {
        self.handles.get(&id)
    }

    pub(crate) fn handle_mut(&mut self, id: HandleId) -> Option<&mut Handle> {
        self.handles.get_mut(&id)
    }

    fn locate_or_err(&self, pid: Pid, visible: HandleId) -> HandleResult<HandleId> {
        self.locate(pid, visible)
            .ok_or(HandleError::InvalidHandle(visible))
    }

    /// Close the handle `pid` knows as `visible`
    pub fn close(&mut self, pid: Pid, visible: HandleId) -> HandleResult<Released<T>> {
        let id = self.locate_or_err(pid, visible)?;
        self.release(id).ok_or(HandleError::InvalidHandle(visible))
    }

    /// New handle on the same file; close-on-exec is not inherited
    pub fn dup(&mut self, pid: Pid, visible: HandleId) -> HandleResult<HandleId> {
        let src = self.locate_or_err(pid, visible)?;
        let file = self.handles[&src].file;
        self.attach(pid, file, HandleFlags::empty(), None)
    }

    // ------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------

    /// Client-visible handle flags (close-on-exec)
    pub fn handle_flags(&self, pid: Pid, visible: HandleId) -> HandleResult<HandleFlags> {
        let id = self.locate_or_err(pid, visible)?;
        Ok(self.handles[&id].flags & HandleFlags::CLIENT_MASK)
    }

    pub fn set_handle_flags(&mut self, pid: Pid, visible: HandleId, bits: u32) -> HandleResult<()> {
        let flags = HandleFlags::from_client(bits).ok_or(HandleError::InvalidFlags(bits))?;
        let id = self.locate_or_err(pid, visible)?;
        if let Some(h) = self.handles.get_mut(&id) {
            h.flags = (h.flags - HandleFlags::CLIENT_MASK) | flags;
        }
        Ok(())
    }

    /// Status flags of the open file, shared with every duplicate
    pub fn status_flags(&self, pid: Pid, visible: HandleId) -> HandleResult<FileFlags> {
        let file = self
            .get_file(pid, visible)
            .ok_or(HandleError::InvalidHandle(visible))?;
        self.files
            .get(file)
            .map(|f| f.flags)
            .ok_or_else(|| HandleError::InvalidFile(file.to_string()))
    }

    pub fn set_status_flags(&mut self, pid: Pid, visible: HandleId, bits: u32) -> HandleResult<()> {
        let flags = FileFlags::from_bits(bits).ok_or(HandleError::InvalidFlags(bits))?;
        let file = self
            .get_file(pid, visible)
            .ok_or(HandleError::InvalidHandle(visible))?;
        let f = self
            .files
            .get_mut(file)
            .ok_or_else(|| HandleError::InvalidFile(file.to_string()))?;
        f.flags = flags;
        Ok(())
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            files: self.files.len(),
            handles: self.handles.len(),
            clients: self.clients.len(),
            transfers: self.transfers.len(),
        }
    }
}

/// Lowest free id that does not collide with a number the client already
/// knows through its translation table, nor with `avoid`; skipped candidates
/// go back to the arena
fn allocate_id(ids: &mut IdArena, client: &Client, avoid: &[HandleId]) -> HandleResult<HandleId> {
    let mut skipped = Vec::new();
    let result = loop {
        match ids.allocate() {
            Some(id) if client.translation.contains_key(&id) || avoid.contains(&id) => {
                skipped.push(id)
            }
            Some(id) => break Ok(id),
            None => {
                break Err(HandleError::TooManyHandles(
                    "handle id space exhausted".into(),
                ))
            }
        }
    };
    for id in skipped {
        ids.release(id);
    }
    result
}
