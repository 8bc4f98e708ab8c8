/*!
 * Handle Service
 *
 * State owned by the dispatch thread: the handle table, the provider, the
 * consumer end of the lifecycle queue, and the work queued between requests
 * (unsettled replies, status notices, woken calls, cancelled calls).
 */

use super::helper::{Poker, Signal};
use super::provider::{IoContext, Provider};
use crate::core::config::ServiceConfig;
use crate::core::types::{EventMask, FileFlags, HandleId, HandleResult, IoOp, Pid};
use crate::lifecycle::{lifecycle_queue, EventKinds, LifecycleBus, LifecycleConsumer, LifecycleProducer, NullBus};
use crate::table::{FileId, HandleTable, Released, TableStats, Waiter};
use crate::transport::{Call, Delivery, Pending};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds a [`HandleService`] and the lifecycle producer that feeds it
pub struct ServiceBuilder {
    config: ServiceConfig,
    bus: Arc<dyn LifecycleBus>,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::default(),
            bus: Arc::new(NullBus),
        }
    }

    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bus(mut self, bus: Arc<dyn LifecycleBus>) -> Self {
        self.bus = bus;
        self
    }

    /// Subscribe to fork/exec/exit and assemble the service
    ///
    /// The returned producer belongs to whatever thread the bus delivers on.
    pub fn build<P: Provider>(
        self,
        provider: P,
    ) -> HandleResult<(HandleService<P>, LifecycleProducer)> {
        self.config.validate()?;
        self.bus.subscribe(EventKinds::all());

        let (poker, pokes) = Poker::channel();
        let (producer, consumer) = lifecycle_queue(
            self.config.lifecycle_capacity,
            Arc::clone(&self.bus),
            poker.clone(),
        );

        info!(
            capacity = self.config.lifecycle_capacity,
            max_per_client = self.config.max_handles_per_client,
            "Handle service initialized"
        );
        let service = HandleService {
            table: HandleTable::new(&self.config),
            provider,
            lifecycle: consumer,
            bus: self.bus,
            confirms: VecDeque::new(),
            notices: VecDeque::new(),
            retry: VecDeque::new(),
            orphans: VecDeque::new(),
            config: self.config,
            poker,
            pokes,
        };
        Ok((service, producer))
    }
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle service for one provider
pub struct HandleService<P: Provider> {
    pub(crate) table: HandleTable<P::File>,
    pub(crate) provider: P,
    pub(crate) lifecycle: LifecycleConsumer,
    pub(crate) bus: Arc<dyn LifecycleBus>,
    /// Replies whose fate is known but whose effects have not run yet
    pub(crate) confirms: VecDeque<(Pending<Self>, Delivery)>,
    pub(crate) notices: VecDeque<(FileId, EventMask)>,
    /// Woken calls, dispatched again in wake order
    pub(crate) retry: VecDeque<Call>,
    /// Parked calls whose handle or client went away
    pub(crate) orphans: VecDeque<Waiter>,
    pub(crate) config: ServiceConfig,
    pub(crate) poker: Poker,
    /// Read by the helper thread while `serve` runs
    pub(crate) pokes: flume::Receiver<Signal>,
}

impl<P: Provider> HandleService<P> {
    /// Service with default configuration and no lifecycle bus
    pub fn new(provider: P) -> HandleResult<Self> {
        ServiceBuilder::new().build(provider).map(|(service, _)| service)
    }

    pub fn builder() -> ServiceBuilder {
        ServiceBuilder::new()
    }

    // ------------------------------------------------------------------
    // Provider-facing API
    // ------------------------------------------------------------------

    /// First phase of file creation; follow with `add_handle` or
    /// `discard_file`
    pub fn new_file(&mut self, flags: FileFlags, payload: P::File) -> HandleResult<FileId> {
        self.table.new_file(flags, payload)
    }

    /// Undo a `new_file` that never got a handle; the payload is closed
    ///
    /// Returns whether a file was discarded.
    pub fn discard_file(&mut self, file: Option<FileId>) -> bool {
        match self.table.discard_file(file) {
            Some(payload) => {
                self.close_payload(payload);
                true
            }
            None => false,
        }
    }

    /// Attach a handle owned by `pid`; only CLOEXEC is accepted in `flags`
    pub fn add_handle(&mut self, pid: Pid, file: FileId, flags: u32) -> HandleResult<HandleId> {
        self.track_client(pid);
        self.table.add_handle(pid, file, flags)
    }

    /// File behind a handle number `pid` uses, inherited ones included
    #[inline]
    pub fn get_file(&self, pid: Pid, handle: HandleId) -> Option<FileId> {
        self.table.get_file(pid, handle)
    }

    pub fn file(&self, file: FileId) -> Option<&P::File> {
        self.table.file(file).map(|f| f.payload())
    }

    pub fn file_mut(&mut self, file: FileId) -> Option<&mut P::File> {
        self.table.file_mut(file).map(|f| f.payload_mut())
    }

    /// Report a status change on `file`
    ///
    /// Fanned out to relays and blockers before the next call is received.
    pub fn notify(&mut self, file: FileId, mask: EventMask) {
        self.notices.push_back((file, mask));
        self.poker.wake();
    }

    /// Leave the dispatch loop with `status`
    pub fn quit(&self, status: i32) {
        info!(status, "Shutdown requested");
        self.poker.shutdown(status);
    }

    /// Poke handle usable from other threads, e.g. for administrative
    /// shutdown
    pub fn poker(&self) -> Poker {
        self.poker.clone()
    }

    /// Run every reply-bound action that is due
    pub fn sync_confirms(&mut self) -> usize {
        let mut settled = 0;
        while let Some((pending, delivery)) = self.confirms.pop_front() {
            pending.settle(self, delivery);
            settled += 1;
        }
        settled
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    #[inline]
    pub fn table(&self) -> &HandleTable<P::File> {
        &self.table
    }

    #[inline]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[inline]
    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    #[inline]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    #[inline]
    pub fn stats(&self) -> TableStats {
        self.table.stats()
    }

    /// Replies waiting for their confirm or rollback
    #[inline]
    pub fn unsettled(&self) -> usize {
        self.confirms.len()
    }

    // ------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------

    /// Register a first-seen client with the lifecycle filter
    pub(crate) fn track_client(&mut self, pid: Pid) {
        if !self.table.has_client(pid) {
            self.table.ensure_client(pid);
            self.bus.add_filter(pid);
        }
    }

    pub(crate) fn close_payload(&mut self, payload: P::File) {
        if let Err(e) = self.provider.close(payload) {
            warn!(error = %e, "Provider close failed, ignoring");
        }
    }

    /// Finish a detach: close an orphaned file, collect a cancelled call
    pub(crate) fn settle_release(&mut self, released: Released<P::File>) {
        if let Some(waiter) = released.cancelled {
            self.orphans.push_back(waiter);
        }
        if let Some(payload) = released.closed {
            self.close_payload(payload);
        }
    }

    /// Rollback action for handle-creating replies
    pub(crate) fn rollback_handle(&mut self, id: HandleId) {
        debug!(handle = id, "Rolling back handle");
        if let Some(released) = self.table.release(id) {
            self.settle_release(released);
        }
    }

    /// Confirm action for close replies
    pub(crate) fn finish_close(&mut self, pid: Pid, handle: HandleId) {
        match self.table.close(pid, handle) {
            Ok(released) => self.settle_release(released),
            Err(e) => debug!(pid, handle, error = %e, "Handle gone before close confirmed"),
        }
    }

    /// Confirm action for read/write replies
    pub(crate) fn confirm_io(&mut self, pid: Pid, handle: HandleId, file: FileId, op: IoOp, count: usize) {
        let Some(f) = self.table.file_mut(file) else {
            debug!(pid, handle, %file, %op, "File closed before confirm");
            return;
        };
        let mut ctx = IoContext::new(pid).on_file(handle, file, f.is_nonblocking());
        self.provider.confirm(&mut ctx, f.payload_mut(), op, count);
        self.notices.extend(ctx.take_notices());
    }
}
