/*!
 * Handles
 * One process's reference to an open file
 */

use super::file::FileId;
use crate::core::types::{EventMask, HandleFlags, HandleId, Pid, Trigger};

/// One process's reference to a [`File`](super::File)
#[derive(Debug, Clone)]
pub struct Handle {
    pub(crate) id: HandleId,
    pub(crate) owner: Pid,
    pub(crate) file: FileId,
    pub(crate) flags: HandleFlags,
    pub(crate) interest: EventMask,
    pub(crate) trigger: Trigger,
    /// Number the owner knows a shadow by
    pub(crate) alias: Option<HandleId>,
    pub(crate) client_slot: usize,
    pub(crate) file_slot: usize,
}

impl Handle {
    #[inline]
    pub fn id(&self) -> HandleId {
        self.id
    }

    #[inline]
    pub fn owner(&self) -> Pid {
        self.owner
    }

    #[inline]
    pub fn file(&self) -> FileId {
        self.file
    }

    #[inline]
    pub fn flags(&self) -> HandleFlags {
        self.flags
    }

    #[inline]
    pub fn interest(&self) -> EventMask {
        self.interest
    }

    #[inline]
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    #[inline]
    pub fn is_shadow(&self) -> bool {
        self.flags.contains(HandleFlags::SHADOW)
    }

    #[inline]
    pub fn is_cloexec(&self) -> bool {
        self.flags.contains(HandleFlags::CLOEXEC)
    }

    /// Handle number as the owning client sees it
    #[inline]
    pub fn visible_id(&self) -> HandleId {
        self.alias.unwrap_or(self.id)
    }
}
