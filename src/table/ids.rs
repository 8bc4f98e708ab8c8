/*!
 * Handle Id Arena
 * Server-wide handle number allocation, lowest free id first
 */

use crate::core::types::HandleId;
use std::collections::BTreeSet;

/// Allocator for handle numbers shared by every client
pub struct IdArena {
    next: HandleId,
    limit: HandleId,
    free: BTreeSet<HandleId>,
}

impl IdArena {
    /// Ids are drawn from `first..limit`
    pub fn new(first: HandleId, limit: HandleId) -> Self {
        Self {
            next: first,
            limit,
            free: BTreeSet::new(),
        }
    }

    /// Lowest available id, or `None` when the id space is exhausted
    pub fn allocate(&mut self) -> Option<HandleId> {
        if let Some(id) = self.free.pop_first() {
            return Some(id);
        }
        if self.next >= self.limit {
            return None;
        }
        let id = self.next;
        self.next += 1;
        Some(id)
    }

    /// Return an id to the arena
    pub fn release(&mut self, id: HandleId) {
        debug_assert!(id < self.next, "releasing id {} never allocated", id);
        if id + 1 == self.next {
            self.next -= 1;
            // Fold the free tail back into the bump pointer
            while self.next > 0 && self.free.remove(&(self.next - 1)) {
                self.next -= 1;
            }
        } else {
            self.free.insert(id);
        }
    }

    /// Ids currently handed out
    pub fn in_use(&self, first: HandleId) -> usize {
        (self.next - first) as usize - self.free.len()
    }
}
