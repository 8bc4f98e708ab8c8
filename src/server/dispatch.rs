/*!
 * Dispatch Loop
 *
 * Each iteration:
 * 1. settle the reply-bound actions of earlier replies
 * 2. apply queued lifecycle events
 * 3. receive one call or poke and handle it
 * 4. fan out status notices and re-dispatch woken calls
 */

use super::helper::Helper;
use super::provider::{IoContext, Provider};
use super::service::HandleService;
use crate::core::errors::HandleError;
use crate::core::types::{EventMask, FastConfirm, HandleFlags, HandleId, HandleResult, IoOp, Pid};
use crate::notify::Wakeup;
use crate::table::FileId;
use crate::transport::{Call, Incoming, Pending, Poke, Reply, Request, Transport};
use tracing::{debug, info, warn};

/// What handling one call produced
enum Outcome<S> {
    Reply {
        reply: Reply,
        pending: Pending<S>,
        /// Settle right after the reply instead of next iteration
        fast: bool,
    },
    /// The call was parked and is answered later
    Parked,
}

impl<S> Outcome<S> {
    fn reply(reply: Reply) -> Self {
        Outcome::Reply {
            reply,
            pending: Pending::new(),
            fast: false,
        }
    }

    fn error(err: HandleError) -> Self {
        Self::reply(Reply::Error(err))
    }

    fn pending(reply: Reply, pending: Pending<S>, fast: bool) -> Self {
        Outcome::Reply {
            reply,
            pending,
            fast,
        }
    }
}

impl<T> From<HandleResult<Reply>> for Outcome<T> {
    fn from(result: HandleResult<Reply>) -> Self {
        match result {
            Ok(reply) => Outcome::reply(reply),
            Err(e) => Outcome::error(e),
        }
    }
}

impl<P: Provider> HandleService<P> {
    /// Run the dispatch loop until `quit` is called
    ///
    /// Returns the status passed to `quit`. Fails when the transport fails,
    /// or when lifecycle events were lost and aborting is disabled. The
    /// helper thread is stopped on every exit, so `serve` can be called
    /// again; pokes posted in between are delivered by the next helper.
    pub fn serve<X: Transport>(&mut self, transport: &mut X) -> HandleResult<i32> {
        // A wake lost with an earlier transport must not block later ones
        self.poker.rearm();
        let helper = Helper::spawn(&self.poker, self.pokes.clone(), transport.poke_target())?;
        info!("Dispatch loop started");

        let result = self.run(transport);
        helper.stop();
        match &result {
            Ok(status) => info!(status, "Dispatch loop finished"),
            Err(e) => warn!(error = %e, "Dispatch loop failed"),
        }
        result
    }

    fn run<X: Transport>(&mut self, transport: &mut X) -> HandleResult<i32> {
        loop {
            self.sync_confirms();
            self.drain_lifecycle()?;

            match transport.receive()? {
                Incoming::Call(call) => self.dispatch(transport, call),
                Incoming::Poke(Poke::Wake) => self.poker.rearm(),
                Incoming::Poke(Poke::Shutdown(status)) => {
                    self.flush(transport)?;
                    self.sync_confirms();
                    return Ok(status);
                }
            }
            self.flush(transport)?;
        }
    }

    /// Handle one call and answer it unless it was parked
    pub fn dispatch<X: Transport>(&mut self, transport: &mut X, call: Call) {
        // A re-dispatched call must not observe uncommitted transfers
        self.sync_confirms();

        let endpoint = call.endpoint;
        let name = call.request.name();
        let pid = call.caller;

        match self.handle_call(call) {
            Outcome::Parked => {}
            Outcome::Reply {
                reply,
                pending,
                fast,
            } => {
                if let Reply::Error(e) = &reply {
                    debug!(pid, op = name, error = %e, "Call failed");
                }
                let delivery = transport.reply(endpoint, reply);
                if !delivery.is_delivered() {
                    debug!(pid, op = name, %endpoint, "Reply not delivered");
                }
                if pending.is_empty() {
                    return;
                }
                if fast {
                    pending.settle(self, delivery);
                } else {
                    self.confirms.push_back((pending, delivery));
                }
            }
        }
    }

    /// Fan out notices, answer orphaned calls, and re-dispatch woken ones
    /// until nothing is left, in FIFO order
    ///
    /// Lifecycle events queued meanwhile are applied before each woken call.
    pub(crate) fn flush<X: Transport>(&mut self, transport: &mut X) -> HandleResult<()> {
        loop {
            while let Some((file, mask)) = self.notices.pop_front() {
                for wakeup in self.table.collect_wakeups(file, mask) {
                    match wakeup {
                        Wakeup::Push { relay, event } => {
                            if !transport.push_event(relay, event).is_delivered() {
                                debug!(%relay, handle = event.handle, "Poll event not delivered");
                            }
                        }
                        Wakeup::Unblock(waiter) => self.retry.push_back(waiter.call),
                    }
                }
            }

            while let Some(waiter) = self.orphans.pop_front() {
                let visible = waiter.call.request.handle().unwrap_or(waiter.handle);
                transport.reply(waiter.call.endpoint, HandleError::InvalidHandle(visible).into());
            }

            if self.retry.is_empty() {
                return Ok(());
            }
            if self.drain_lifecycle()? > 0 {
                // An exit or exec may have orphaned calls or released handles
                continue;
            }
            let Some(call) = self.retry.pop_front() else {
                return Ok(());
            };
            if transport.is_live(call.endpoint) {
                self.dispatch(transport, call);
            } else {
                debug!(pid = call.caller, endpoint = %call.endpoint, "Woken caller is gone");
                transport.abandon(call.endpoint);
            }
        }
    }

    fn handle_call(&mut self, call: Call) -> Outcome<Self> {
        let pid = call.caller;
        self.track_client(pid);

        match &call.request {
            Request::Open { flags, arg } => self.handle_open(pid, *flags, arg),
            Request::Read { handle, len } => self.handle_read(&call, *handle, *len),
            Request::Write { handle, data } => self.handle_write(&call, *handle, data),
            Request::Ioctl { handle, cmd, arg } => self.handle_ioctl(pid, *handle, *cmd, arg).into(),
            Request::Close { handle } => self.handle_close(pid, *handle),
            Request::Dup { handle } => {
                let created = self.table.dup(pid, *handle);
                self.handle_created(created)
            }
            Request::DupTo { handle, target } => {
                // The target may never call in; its exit must still be seen
                self.bus.add_filter(*target);
                let created = self.table.dup_to(pid, *handle, *target);
                self.handle_created(created)
            }
            Request::Touch { handle } => self.table.touch(pid, *handle).map(|_| Reply::Done).into(),
            Request::GetHandleFlags { handle } => self
                .table
                .handle_flags(pid, *handle)
                .map(|f| Reply::Flags(f.bits()))
                .into(),
            Request::SetHandleFlags { handle, flags } => self
                .table
                .set_handle_flags(pid, *handle, *flags)
                .map(|_| Reply::Done)
                .into(),
            Request::GetStatusFlags { handle } => self
                .table
                .status_flags(pid, *handle)
                .map(|f| Reply::Flags(f.bits()))
                .into(),
            Request::SetStatusFlags { handle, flags } => self
                .table
                .set_status_flags(pid, *handle, *flags)
                .map(|_| Reply::Done)
                .into(),
            Request::SetNotify {
                handle,
                mask,
                trigger,
                relay,
            } => match self.table.set_interest(pid, *handle, *mask, *trigger, *relay) {
                Ok((file, parked)) => {
                    // Switching modes re-delivers the parked call
                    if let Some(waiter) = parked {
                        self.retry.push_back(waiter.call);
                    }
                    self.status(file, *mask).map(Reply::Status).into()
                }
                Err(e) => Outcome::error(e),
            },
            Request::Poll { handle, mask } => self
                .table
                .get_file(pid, *handle)
                .ok_or(HandleError::InvalidHandle(*handle))
                .and_then(|file| self.status(file, *mask))
                .map(Reply::Status)
                .into(),
        }
    }

    /// Current status intersected with `mask` plus HANGUP
    fn status(&self, file: FileId, mask: EventMask) -> HandleResult<EventMask> {
        let f = self
            .table
            .file(file)
            .ok_or_else(|| HandleError::InvalidFile(file.to_string()))?;
        Ok(self.provider.status(f.payload()) & (mask | EventMask::HANGUP))
    }

    fn handle_open(&mut self, pid: Pid, flags: u32, arg: &[u8]) -> Outcome<Self> {
        let mut ctx = IoContext::new(pid);
        let opened = self.provider.open(&mut ctx, flags, arg);
        self.notices.extend(ctx.take_notices());

        let (file_flags, payload) = match opened {
            Ok(opened) => opened,
            Err(e) => return Outcome::error(e),
        };
        let file = match self.table.new_file(file_flags, payload) {
            Ok(file) => file,
            Err(e) => return Outcome::error(e),
        };
        let created = self
            .table
            .add_handle(pid, file, flags & HandleFlags::CLIENT_MASK.bits());
        if created.is_err() {
            self.discard_file(Some(file));
        }
        self.handle_created(created)
    }

    /// Reply with a new handle; a lost reply releases it again
    fn handle_created(&mut self, created: HandleResult<HandleId>) -> Outcome<Self> {
        match created {
            Ok(id) => {
                let mut pending = Pending::new();
                pending.on_rollback(move |svc: &mut Self| svc.rollback_handle(id));
                Outcome::pending(Reply::Handle(id), pending, false)
            }
            Err(e) => Outcome::error(e),
        }
    }

    fn handle_close(&mut self, pid: Pid, handle: HandleId) -> Outcome<Self> {
        if self.table.locate(pid, handle).is_none() {
            return Outcome::error(HandleError::InvalidHandle(handle));
        }
        // Only a delivered reply closes; a client that never heard back can retry
        let mut pending = Pending::new();
        pending.on_confirm(move |svc: &mut Self| svc.finish_close(pid, handle));
        let fast = self.provider.fast_confirm().contains(FastConfirm::CLOSE);
        Outcome::pending(Reply::Done, pending, fast)
    }

    fn handle_read(&mut self, call: &Call, handle: HandleId, len: usize) -> Outcome<Self> {
        let pid = call.caller;
        let Some(file) = self.table.get_file(pid, handle) else {
            return Outcome::error(HandleError::InvalidHandle(handle));
        };
        let Some(f) = self.table.file_mut(file) else {
            return Outcome::error(HandleError::InvalidFile(file.to_string()));
        };
        let mut ctx = IoContext::new(pid).on_file(handle, file, f.is_nonblocking());
        let result = self.provider.read(&mut ctx, f.payload_mut(), len);
        self.notices.extend(ctx.take_notices());

        match result {
            Ok(data) => {
                let count = data.len();
                let mut pending = Pending::new();
                pending.on_confirm(move |svc: &mut Self| {
                    svc.confirm_io(pid, handle, file, IoOp::Read, count)
                });
                let fast = self.provider.fast_confirm().contains(FastConfirm::READ);
                Outcome::pending(Reply::Data(data), pending, fast)
            }
            Err(HandleError::WouldBlock) if !ctx.nonblocking => {
                self.park(call, handle, EventMask::READABLE)
            }
            Err(e) => Outcome::error(e),
        }
    }

    fn handle_write(&mut self, call: &Call, handle: HandleId, data: &[u8]) -> Outcome<Self> {
        let pid = call.caller;
        let Some(file) = self.table.get_file(pid, handle) else {
            return Outcome::error(HandleError::InvalidHandle(handle));
        };
        let Some(f) = self.table.file_mut(file) else {
            return Outcome::error(HandleError::InvalidFile(file.to_string()));
        };
        let mut ctx = IoContext::new(pid).on_file(handle, file, f.is_nonblocking());
        let result = self.provider.write(&mut ctx, f.payload_mut(), data);
        self.notices.extend(ctx.take_notices());

        match result {
            Ok(count) => {
                let mut pending = Pending::new();
                pending.on_confirm(move |svc: &mut Self| {
                    svc.confirm_io(pid, handle, file, IoOp::Write, count)
                });
                let fast = self.provider.fast_confirm().contains(FastConfirm::WRITE);
                Outcome::pending(Reply::Count(count), pending, fast)
            }
            Err(HandleError::WouldBlock) if !ctx.nonblocking => {
                self.park(call, handle, EventMask::WRITABLE)
            }
            Err(e) => Outcome::error(e),
        }
    }

    fn handle_ioctl(&mut self, pid: Pid, handle: HandleId, cmd: u32, arg: &[u8]) -> HandleResult<Reply> {
        let file = self
            .table
            .get_file(pid, handle)
            .ok_or(HandleError::InvalidHandle(handle))?;
        let f = self
            .table
            .file_mut(file)
            .ok_or_else(|| HandleError::InvalidFile(file.to_string()))?;
        let mut ctx = IoContext::new(pid).on_file(handle, file, f.is_nonblocking());
        let result = self.provider.ioctl(&mut ctx, f.payload_mut(), cmd, arg);
        self.notices.extend(ctx.take_notices());
        result.map(Reply::Data)
    }

    /// Park a blocking call that cannot make progress
    fn park(&mut self, call: &Call, handle: HandleId, wanted: EventMask) -> Outcome<Self> {
        let Some(real) = self.table.locate(call.caller, handle) else {
            return Outcome::error(HandleError::InvalidHandle(handle));
        };
        match self.table.park(call.caller, real, wanted, call.clone()) {
            Ok(()) => Outcome::Parked,
            Err(e) => {
                warn!(pid = call.caller, handle, "Blocking call refused, client already waiting");
                Outcome::error(e)
            }
        }
    }
}
