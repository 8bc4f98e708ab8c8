/*!
 * Open File Descriptions
 */

use crate::core::arena::ArenaKey;
use crate::core::types::{FileFlags, HandleId};

/// Key of an open file in the table's arena
pub type FileId = ArenaKey;

/// One open file description, shared by every handle derived from it
pub struct File<T> {
    pub(crate) flags: FileFlags,
    /// Back-references to attached handles; order is insertion order up to
    /// swap-removal
    pub(crate) handles: Vec<HandleId>,
    pub(crate) payload: T,
}

impl<T> File<T> {
    pub(crate) fn new(flags: FileFlags, payload: T) -> Self {
        Self {
            flags,
            handles: Vec::new(),
            payload,
        }
    }

    #[inline]
    pub fn flags(&self) -> FileFlags {
        self.flags
    }

    #[inline]
    pub fn is_nonblocking(&self) -> bool {
        self.flags.contains(FileFlags::NONBLOCK)
    }

    #[inline]
    pub fn handles(&self) -> &[HandleId] {
        &self.handles
    }

    /// A file with at least one handle attached is committed
    #[inline]
    pub fn is_committed(&self) -> bool {
        !self.handles.is_empty()
    }

    #[inline]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut T {
        &mut self.payload
    }

    /// Append a back-reference, returning its slot
    pub(crate) fn attach(&mut self, handle: HandleId) -> usize {
        self.handles.push(handle);
        self.handles.len() - 1
    }

    /// Swap-remove the back-reference at `slot`; returns the handle that was
    /// moved into `slot`, whose stored index the caller must fix up
    pub(crate) fn detach(&mut self, slot: usize) -> Option<HandleId> {
        self.handles.swap_remove(slot);
        self.handles.get(slot).copied()
    }
}
