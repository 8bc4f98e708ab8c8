/*!
 * Provider Trait
 * Callbacks a file/device/socket provider plugs into the dispatch loop
 */

use crate::core::errors::HandleError;
use crate::core::types::{EventMask, FastConfirm, FileFlags, HandleId, HandleResult, IoOp, Pid};
use crate::table::FileId;

/// Per-call context handed to provider callbacks
#[derive(Debug)]
pub struct IoContext {
    pub pid: Pid,
    /// Handle number as the caller knows it
    pub handle: Option<HandleId>,
    pub file: Option<FileId>,
    /// Whether the open file is in non-blocking mode
    pub nonblocking: bool,
    notices: Vec<(FileId, EventMask)>,
}

impl IoContext {
    pub(crate) fn new(pid: Pid) -> Self {
        Self {
            pid,
            handle: None,
            file: None,
            nonblocking: false,
            notices: Vec::new(),
        }
    }

    pub(crate) fn on_file(mut self, handle: HandleId, file: FileId, nonblocking: bool) -> Self {
        self.handle = Some(handle);
        self.file = Some(file);
        self.nonblocking = nonblocking;
        self
    }

    /// Report a status change on `file`; fanned out once the callback returns
    pub fn notify(&mut self, file: FileId, mask: EventMask) {
        self.notices.push((file, mask));
    }

    pub(crate) fn take_notices(&mut self) -> Vec<(FileId, EventMask)> {
        std::mem::take(&mut self.notices)
    }
}

/// Business logic of one provider
///
/// Only `read`, `write` and `status` are mandatory. A callback that cannot
/// make progress returns [`HandleError::WouldBlock`]; the dispatch loop then
/// either answers EAGAIN (non-blocking file) or parks the call until a
/// `notify` on the file wakes it.
pub trait Provider: 'static {
    /// Provider-owned state of one open file
    type File: 'static;

    /// Create the payload for a new open file
    fn open(
        &mut self,
        _ctx: &mut IoContext,
        _flags: u32,
        _arg: &[u8],
    ) -> HandleResult<(FileFlags, Self::File)> {
        Err(HandleError::NotSupported)
    }

    /// Produce up to `len` bytes; the transfer is committed by `confirm`
    fn read(&mut self, ctx: &mut IoContext, file: &mut Self::File, len: usize)
        -> HandleResult<Vec<u8>>;

    /// Accept a prefix of `data`; the transfer is committed by `confirm`
    fn write(&mut self, ctx: &mut IoContext, file: &mut Self::File, data: &[u8])
        -> HandleResult<usize>;

    fn ioctl(
        &mut self,
        _ctx: &mut IoContext,
        _file: &mut Self::File,
        _cmd: u32,
        _arg: &[u8],
    ) -> HandleResult<Vec<u8>> {
        Err(HandleError::NotSupported)
    }

    /// Current readiness of the file
    fn status(&self, file: &Self::File) -> EventMask;

    /// A read or write reply reached the caller: commit `count` bytes
    fn confirm(&mut self, _ctx: &mut IoContext, _file: &mut Self::File, _op: IoOp, _count: usize) {}

    /// The file lost its last handle
    fn close(&mut self, _file: Self::File) -> HandleResult<()> {
        Ok(())
    }

    /// Operations whose confirm runs right after the reply instead of at
    /// the next dispatch iteration
    fn fast_confirm(&self) -> FastConfirm {
        FastConfirm::empty()
    }
}
