//! Per-instance slot vector.

use parking_lot::Mutex;

use crate::error::{AttrError, Result};
use crate::value::Value;

/// Fixed-size slot storage, sized to the owning type's schema table at
/// allocation. `None` is the unset sentinel; null is a stored value.
#[derive(Debug)]
pub(crate) struct ObjectStorage {
    slots: Mutex<Box<[Option<Value>]>>,
}

impl ObjectStorage {
    pub fn new(len: usize) -> Self {
        Self {
            slots: Mutex::new(vec![None; len].into_boxed_slice()),
        }
    }

    /// Value in the slot. Indices past the end read as unset: attributes
    /// added to a type after this instance was allocated have no slot here.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.slots.lock().get(index).cloned().flatten()
    }

    /// Store `value`, returning the previous one.
    pub fn set(&self, index: usize, value: Value) -> Result<Option<Value>> {
        let mut slots = self.slots.lock();
        let len = slots.len();
        let slot = slots
            .get_mut(index)
            .ok_or(AttrError::SlotOutOfRange { index, len })?;
        Ok(slot.replace(value))
    }

    /// Clear the slot, returning what it held.
    pub fn take(&self, index: usize) -> Option<Value> {
        self.slots.lock().get_mut(index).and_then(Option::take)
    }

    /// Whether the storage was allocated with a slot at `index`.
    pub fn has_slot(&self, index: usize) -> bool {
        index < self.slots.lock().len()
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.slots.lock().get(index).is_some_and(Option::is_some)
    }
}
