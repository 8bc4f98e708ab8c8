/*!
 * Shared Test Fixtures
 * Scripted transport and an in-memory mailbox provider
 */

#![allow(dead_code)]

use ahash::HashSet;
use handle_service::core::types::{EventMask, FastConfirm, FileFlags, HandleResult, IoOp};
use handle_service::server::{IoContext, Provider};
use handle_service::transport::{
    Call, Delivery, Endpoint, Incoming, Poke, PokeTarget, PollEvent, Reply, Request, Transport,
};
use handle_service::{FileId, HandleError, HandleId, HandleService, Pid};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// ioctl command that marks a mailbox as hung up
pub const IOCTL_HANGUP: u32 = 1;

/// One open mailbox
#[derive(Debug, Default)]
pub struct Mailbox {
    pub id: u32,
    pub buf: VecDeque<u8>,
    pub hangup: bool,
}

/// Provider whose files are byte queues
///
/// Reads peek and only consume once the reply is confirmed; writes append
/// immediately and report READABLE.
#[derive(Default)]
pub struct Mailboxes {
    next_id: u32,
    pub closed: Arc<Mutex<Vec<u32>>>,
    pub confirmed: Vec<(IoOp, usize)>,
    pub fast: FastConfirm,
}

impl Mailboxes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fast_confirm(fast: FastConfirm) -> Self {
        Self {
            fast,
            ..Self::default()
        }
    }

    pub fn mailbox(&mut self) -> Mailbox {
        self.next_id += 1;
        Mailbox {
            id: self.next_id,
            ..Mailbox::default()
        }
    }
}

impl Provider for Mailboxes {
    type File = Mailbox;

    fn open(
        &mut self,
        _ctx: &mut IoContext,
        _flags: u32,
        arg: &[u8],
    ) -> HandleResult<(FileFlags, Mailbox)> {
        let flags = if arg == b"nonblock" {
            FileFlags::NONBLOCK
        } else {
            FileFlags::empty()
        };
        Ok((flags, self.mailbox()))
    }

    fn read(&mut self, _ctx: &mut IoContext, file: &mut Mailbox, len: usize) -> HandleResult<Vec<u8>> {
        if file.buf.is_empty() {
            return if file.hangup {
                Ok(Vec::new())
            } else {
                Err(HandleError::WouldBlock)
            };
        }
        Ok(file.buf.iter().take(len).copied().collect())
    }

    fn write(&mut self, ctx: &mut IoContext, file: &mut Mailbox, data: &[u8]) -> HandleResult<usize> {
        if file.hangup {
            return Err(HandleError::Provider("mailbox hung up".into()));
        }
        file.buf.extend(data);
        if let Some(id) = ctx.file {
            ctx.notify(id, EventMask::READABLE);
        }
        Ok(data.len())
    }

    fn ioctl(
        &mut self,
        ctx: &mut IoContext,
        file: &mut Mailbox,
        cmd: u32,
        _arg: &[u8],
    ) -> HandleResult<Vec<u8>> {
        match cmd {
            IOCTL_HANGUP => {
                file.hangup = true;
                if let Some(id) = ctx.file {
                    ctx.notify(id, EventMask::HANGUP);
                }
                Ok(Vec::new())
            }
            _ => Err(HandleError::NotSupported),
        }
    }

    fn status(&self, file: &Mailbox) -> EventMask {
        let mut status = EventMask::WRITABLE;
        if !file.buf.is_empty() {
            status |= EventMask::READABLE;
        }
        if file.hangup {
            status |= EventMask::HANGUP;
        }
        status
    }

    fn confirm(&mut self, _ctx: &mut IoContext, file: &mut Mailbox, op: IoOp, count: usize) {
        if op == IoOp::Read {
            file.buf.drain(..count.min(file.buf.len()));
        }
        self.confirmed.push((op, count));
    }

    fn close(&mut self, file: Mailbox) -> HandleResult<()> {
        self.closed.lock().push(file.id);
        Ok(())
    }

    fn fast_confirm(&self) -> FastConfirm {
        self.fast
    }
}

/// One scripted step
enum Step {
    Deliver(Incoming),
    /// Side effect run when `receive` reaches it
    Run(Box<dyn FnOnce()>),
}

/// Transport replaying a fixed list of calls
///
/// Once the script runs out, `receive` reports a shutdown with status 0.
#[derive(Default)]
pub struct ScriptTransport {
    script: VecDeque<Step>,
    next_endpoint: u64,
    failing: HashSet<Endpoint>,
    dead: HashSet<Endpoint>,
    pub abandoned: Vec<Endpoint>,
    pub replies: Vec<(Endpoint, Reply)>,
    pub pushes: Vec<(Endpoint, PollEvent)>,
}

impl ScriptTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a call and return its endpoint
    pub fn call(&mut self, pid: Pid, request: Request) -> Endpoint {
        self.next_endpoint += 1;
        let endpoint = Endpoint(self.next_endpoint);
        self.script
            .push_back(Step::Deliver(Incoming::Call(Call::new(pid, endpoint, request))));
        endpoint
    }

    /// Queue a call whose reply will fail to reach the caller
    pub fn lossy_call(&mut self, pid: Pid, request: Request) -> Endpoint {
        let endpoint = self.call(pid, request);
        self.failing.insert(endpoint);
        endpoint
    }

    pub fn poke(&mut self, poke: Poke) {
        self.script.push_back(Step::Deliver(Incoming::Poke(poke)));
    }

    /// Run `action` just before the next scripted item is received
    pub fn then(&mut self, action: impl FnOnce() + 'static) {
        self.script.push_back(Step::Run(Box::new(action)));
    }

    /// Make a parked endpoint unreachable
    pub fn kill(&mut self, endpoint: Endpoint) {
        self.dead.insert(endpoint);
    }

    pub fn reply(&self, endpoint: Endpoint) -> Option<&Reply> {
        self.replies
            .iter()
            .find(|(ep, _)| *ep == endpoint)
            .map(|(_, reply)| reply)
    }

    pub fn handle(&self, endpoint: Endpoint) -> HandleId {
        match self.reply(endpoint) {
            Some(Reply::Handle(id)) => *id,
            other => panic!("expected a handle reply for {endpoint}, got {other:?}"),
        }
    }

    pub fn errno(&self, endpoint: Endpoint) -> Option<i32> {
        match self.reply(endpoint) {
            Some(Reply::Error(e)) => Some(e.errno()),
            _ => None,
        }
    }
}

struct Discard;

impl PokeTarget for Discard {
    fn deliver(&self, _poke: Poke) -> HandleResult<()> {
        Ok(())
    }
}

impl Transport for ScriptTransport {
    fn receive(&mut self) -> HandleResult<Incoming> {
        while let Some(step) = self.script.pop_front() {
            match step {
                Step::Deliver(incoming) => return Ok(incoming),
                Step::Run(action) => action(),
            }
        }
        Ok(Incoming::Poke(Poke::Shutdown(0)))
    }

    fn reply(&mut self, endpoint: Endpoint, reply: Reply) -> Delivery {
        if self.failing.contains(&endpoint) || self.dead.contains(&endpoint) {
            return Delivery::Failed;
        }
        self.replies.push((endpoint, reply));
        Delivery::Delivered
    }

    fn push_event(&mut self, relay: Endpoint, event: PollEvent) -> Delivery {
        self.pushes.push((relay, event));
        Delivery::Delivered
    }

    fn is_live(&self, endpoint: Endpoint) -> bool {
        !self.dead.contains(&endpoint)
    }

    fn abandon(&mut self, endpoint: Endpoint) {
        self.abandoned.push(endpoint);
    }

    fn poke_target(&self) -> Box<dyn PokeTarget> {
        Box::new(Discard)
    }
}

/// Service over mailboxes with default configuration
pub fn service() -> HandleService<Mailboxes> {
    HandleService::new(Mailboxes::new()).unwrap()
}

/// Create a mailbox file and a handle on it for `pid`
pub fn open(svc: &mut HandleService<Mailboxes>, pid: Pid) -> (FileId, HandleId) {
    let mailbox = svc.provider_mut().mailbox();
    let file = svc.new_file(FileFlags::empty(), mailbox).unwrap();
    let handle = svc.add_handle(pid, file, 0).unwrap();
    (file, handle)
}

/// Run the service over `transport` until its script is exhausted
pub fn run(svc: &mut HandleService<Mailboxes>, transport: &mut ScriptTransport) {
    assert_eq!(svc.serve(transport).unwrap(), 0);
}

pub fn closed(svc: &HandleService<Mailboxes>) -> Vec<u32> {
    svc.provider().closed.lock().clone()
}
