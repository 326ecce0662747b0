// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! A bounded pool of positive integer handles, shared by the key/value and file APIs. `0` and
//! negative values are never valid; a closed slot is zeroed so use-after-close is detectable.

use std::sync::Mutex;

use crate::error::{PersistenceError, Result};
use crate::types::ResourceKey;

/// What kind of open object a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    File,
    Key,
}

/// The bookkeeping a handle carries while open.
#[derive(Debug, Clone)]
pub struct HandleEntry {
    pub kind: HandleKind,
    pub resource_key: ResourceKey,
    pub read_only: bool,
}

enum Slot {
    Free,
    Occupied(HandleEntry),
}

pub struct HandleTable {
    slots: Mutex<Vec<Slot>>,
}

impl HandleTable {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot::Free);
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Allocates the next free slot and returns its id, which is always `> 0`.
    pub fn acquire(&self, entry: HandleEntry) -> Result<i32> {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        let index = slots
            .iter()
            .position(|slot| matches!(slot, Slot::Free))
            .ok_or(PersistenceError::MaxHandle)?;
        slots[index] = Slot::Occupied(entry);
        Ok(index as i32 + 1)
    }

    /// Returns a clone of the entry behind `handle`, or `InvalidHandle` if it is not open.
    pub fn get(&self, handle: i32) -> Result<HandleEntry> {
        let slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        let entry = Self::index_of(handle)
            .and_then(|index| slots.get(index))
            .and_then(|slot| match slot {
                Slot::Occupied(entry) => Some(entry.clone()),
                Slot::Free => None,
            });
        entry.ok_or(PersistenceError::InvalidHandle(handle))
    }

    /// Frees `handle`'s slot, zeroing its resource identity. Returns `InvalidHandle` if it was
    /// already closed (or never opened).
    pub fn release(&self, handle: i32) -> Result<HandleEntry> {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        let index = Self::index_of(handle).ok_or(PersistenceError::InvalidHandle(handle))?;
        let slot = slots.get_mut(index).ok_or(PersistenceError::InvalidHandle(handle))?;
        match std::mem::replace(slot, Slot::Free) {
            Slot::Occupied(entry) => Ok(entry),
            Slot::Free => Err(PersistenceError::InvalidHandle(handle)),
        }
    }

    fn index_of(handle: i32) -> Option<usize> {
        if handle <= 0 {
            None
        } else {
            Some(handle as usize - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> HandleEntry {
        HandleEntry {
            kind: HandleKind::File,
            resource_key: ResourceKey::new(1, "r", 0, 0),
            read_only: false,
        }
    }

    #[test]
    fn acquired_handles_are_positive() {
        let table = HandleTable::new(4);
        let h = table.acquire(entry()).unwrap();
        assert!(h > 0);
    }

    #[test]
    fn closed_handle_cannot_be_reused_before_release() {
        let table = HandleTable::new(1);
        let h = table.acquire(entry()).unwrap();
        assert!(matches!(table.acquire(entry()), Err(PersistenceError::MaxHandle)));
        table.release(h).unwrap();
        let h2 = table.acquire(entry()).unwrap();
        assert_eq!(h, h2);
    }

    #[test]
    fn use_after_close_is_invalid_handle() {
        let table = HandleTable::new(2);
        let h = table.acquire(entry()).unwrap();
        table.release(h).unwrap();
        assert!(matches!(table.get(h), Err(PersistenceError::InvalidHandle(_))));
        assert!(matches!(table.release(h), Err(PersistenceError::InvalidHandle(_))));
    }

    #[test]
    fn zero_and_negative_are_never_valid() {
        let table = HandleTable::new(2);
        assert!(matches!(table.get(0), Err(PersistenceError::InvalidHandle(0))));
        assert!(matches!(table.get(-3), Err(PersistenceError::InvalidHandle(-3))));
    }

    #[test]
    fn exhausted_pool_returns_max_handle() {
        let table = HandleTable::new(2);
        table.acquire(entry()).unwrap();
        table.acquire(entry()).unwrap();
        assert!(matches!(table.acquire(entry()), Err(PersistenceError::MaxHandle)));
    }
}
