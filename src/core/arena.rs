/*!
 * Generational Arena
 * Slab storage with generation-checked keys
 */

use serde::{Deserialize, Serialize};
use slab::Slab;
use std::fmt;

/// Key into a [`GenArena`]; stale once its slot is reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArenaKey {
    index: u32,
    generation: u32,
}

impl ArenaKey {
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ArenaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct Entry<T> {
    generation: u32,
    value: T,
}

/// Slab whose keys carry the generation they were issued under
///
/// A key from a removed entry never resolves to the value that later
/// occupies the same slot.
pub struct GenArena<T> {
    slots: Slab<Entry<T>>,
    generation: u32,
    capacity: usize,
}

impl<T> GenArena<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Slab::new(),
            generation: 0,
            capacity,
        }
    }

    /// Insert a value, or hand it back when the arena is full
    pub fn insert(&mut self, value: T) -> Result<ArenaKey, T> {
        if self.slots.len() >= self.capacity {
            return Err(value);
        }
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let index = self.slots.insert(Entry { generation, value });
        Ok(ArenaKey {
            index: index as u32,
            generation,
        })
    }

    #[inline]
    pub fn get(&self, key: ArenaKey) -> Option<&T> {
        self.slots
            .get(key.index as usize)
            .filter(|e| e.generation == key.generation)
            .map(|e| &e.value)
    }

    #[inline]
    pub fn get_mut(&mut self, key: ArenaKey) -> Option<&mut T> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|e| e.generation == key.generation)
            .map(|e| &mut e.value)
    }

    #[inline]
    pub fn contains(&self, key: ArenaKey) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: ArenaKey) -> Option<T> {
        if !self.contains(key) {
            return None;
        }
        Some(self.slots.remove(key.index as usize).value)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_key_after_reuse() {
        let mut arena = GenArena::with_capacity(4);
        let first = arena.insert("first").unwrap();
        assert_eq!(arena.remove(first), Some("first"));

        let second = arena.insert("second").unwrap();
        assert_eq!(first.index(), second.index());
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.get(second), Some(&"second"));
        assert_eq!(arena.remove(first), None);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_capacity() {
        let mut arena = GenArena::with_capacity(1);
        assert!(arena.insert(1).is_ok());
        assert_eq!(arena.insert(2), Err(2));
    }
}
