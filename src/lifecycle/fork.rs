/*!
 * Fork Replication
 *
 * The child inherits every handle of the parent under the same number. Each
 * inherited handle is a shadow: a real handle owned by the child that is only
 * reachable through the child's translation table, so the numbers the child
 * already knows never alias a later allocation.
 *
 * Entries of the parent's own translation table are replicated as well, which
 * keeps translation one hop deep for grandchildren.
 */

use crate::core::types::{HandleFlags, HandleId, HandleResult, Pid};
use crate::table::{FileId, HandleTable};
use tracing::debug;

impl<T> HandleTable<T> {
    /// Give `child` a shadow of every handle `parent` can name
    ///
    /// Returns the number of shadows created. On failure every shadow created
    /// by this call is released again and the error is returned.
    pub fn replicate(&mut self, parent: Pid, child: Pid) -> HandleResult<usize> {
        let Some(p) = self.client(parent) else {
            debug!(parent, child, "Fork from unknown client, nothing to replicate");
            return Ok(0);
        };

        // (visible number, file, flags)
        let mut plan: Vec<(HandleId, FileId, HandleFlags)> = Vec::new();
        for &id in p.handles() {
            if let Some(h) = self.handle(id) {
                if !h.is_shadow() {
                    plan.push((id, h.file(), h.flags()));
                }
            }
        }
        for (visible, shadow) in p.translations() {
            if let Some(h) = self.handle(shadow) {
                plan.push((visible, h.file(), h.flags()));
            }
        }

        let mut created = Vec::with_capacity(plan.len());
        for (visible, file, flags) in plan {
            let flags = (flags - HandleFlags::TRANSFER) | HandleFlags::SHADOW;
            match self.attach(child, file, flags, Some(visible)) {
                Ok(id) => created.push(id),
                Err(e) => {
                    debug!(parent, child, visible, created = created.len(), "Rolling back partial replication");
                    for id in created {
                        // The parent still holds every file, so nothing closes here
                        self.release(id);
                    }
                    return Err(e);
                }
            }
        }

        debug!(parent, child, shadows = created.len(), "Replicated handles");
        Ok(created.len())
    }
}

#[cfg(test)]
mod tests {
    use crate::core::config::ServiceConfig;
    use crate::core::types::FileFlags;
    use crate::table::HandleTable;

    #[test]
    fn test_child_sees_parent_numbers() {
        let mut t: HandleTable<u8> = HandleTable::new(&ServiceConfig::default());
        let file = t.new_file(FileFlags::empty(), 7).unwrap();
        let id = t.add_handle(1, file, 0).unwrap();

        assert_eq!(t.replicate(1, 2).unwrap(), 1);
        assert_eq!(t.get_file(2, id), Some(file));
        // Only through translation
        assert!(t.resolve(2, id).is_none());

        // New child allocations never reuse the inherited number
        let other = t.new_file(FileFlags::empty(), 8).unwrap();
        assert_ne!(t.add_handle(2, other, 0).unwrap(), id);
    }

    #[test]
    fn test_grandchild_is_one_hop() {
        let mut t: HandleTable<u8> = HandleTable::new(&ServiceConfig::default());
        let file = t.new_file(FileFlags::empty(), 7).unwrap();
        let id = t.add_handle(1, file, 0).unwrap();
        t.replicate(1, 2).unwrap();
        t.replicate(2, 3).unwrap();

        let shadow = t.client(3).unwrap().translate(id).unwrap();
        assert_eq!(t.handle(shadow).unwrap().owner(), 3);
        assert_eq!(t.get_file(3, id), Some(file));
    }

    #[test]
    fn test_failure_rolls_back() {
        let config = ServiceConfig::default().with_max_handles_per_client(2);
        let mut t: HandleTable<u8> = HandleTable::new(&config);
        let file = t.new_file(FileFlags::empty(), 7).unwrap();
        t.add_handle(1, file, 0).unwrap();
        t.add_handle(1, file, 0).unwrap();

        // The child already owns one handle, so only one of two shadows fits
        let own = t.new_file(FileFlags::empty(), 9).unwrap();
        t.add_handle(2, own, 0).unwrap();
        let before = t.stats();

        assert!(t.replicate(1, 2).is_err());
        assert_eq!(t.stats(), before);
        assert_eq!(t.client(2).unwrap().translations().count(), 0);
    }
}
