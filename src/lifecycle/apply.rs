/*!
 * Lifecycle Application
 * Drains the lifecycle queue into the handle table between requests
 */

use super::event::{LifecycleEvent, LifecycleKind};
use super::queue::Drained;
use crate::core::errors::HandleError;
use crate::core::types::HandleResult;
use crate::server::{HandleService, Provider};
use crate::table::Teardown;
use tracing::{error, info};

impl<P: Provider> HandleService<P> {
    /// Apply every queued lifecycle event
    ///
    /// Lost events leave descriptor spaces out of sync for good, so overflow
    /// aborts the process unless `abort_on_overflow` is off, in which case
    /// it is returned as an error.
    pub fn drain_lifecycle(&mut self) -> HandleResult<usize> {
        let mut applied = 0;
        while let Some(item) = self.lifecycle.pop() {
            match item {
                Drained::Event(event) => {
                    self.apply_event(event);
                    applied += 1;
                }
                Drained::Overflow => {
                    error!(
                        capacity = self.lifecycle.capacity(),
                        "Lifecycle queue overflowed, events were lost"
                    );
                    if self.config.abort_on_overflow {
                        std::process::abort();
                    }
                    return Err(HandleError::LifecycleOverflow);
                }
            }
        }
        Ok(applied)
    }

    fn apply_event(&mut self, event: LifecycleEvent) {
        info!(%event, "Applying lifecycle event");
        match event.kind {
            LifecycleKind::Fork { child } => {
                if let Err(e) = self.table.replicate(event.pid, child) {
                    error!(parent = event.pid, child, error = %e, "Fork replication failed");
                }
            }
            LifecycleKind::Exec => {
                let sweep = self.table.sweep_cloexec(event.pid);
                self.settle_teardown(sweep);
            }
            LifecycleKind::Exit { .. } => {
                let teardown = self.table.teardown(event.pid);
                self.settle_teardown(teardown);
                self.bus.remove_filter(event.pid);
            }
        }
    }

    fn settle_teardown(&mut self, teardown: Teardown<P::File>) {
        if let Some(waiter) = teardown.cancelled {
            self.orphans.push_back(waiter);
        }
        for released in teardown.released {
            self.settle_release(released);
        }
    }
}
