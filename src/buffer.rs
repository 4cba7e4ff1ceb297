//! Growable slot storage for captures.
//!
//! The first [`INLINE_SLOTS`] slots live inline, so short traces never
//! allocate. Past that the buffer moves to the system allocator and doubles
//! on every overflow. Growth goes through fallible allocation only: running
//! out of memory ends the capture with what was already stored.

#[cfg(test)]
mod tests;

use core::fmt;

use smallvec::SmallVec;

use crate::slot::Slot;

/// Slots stored without touching any allocator.
pub const INLINE_SLOTS: usize = 16;

/// Default maximum number of slots in one capture.
pub const BACKTRACE_BUFFER_SIZE: usize = 1024;

/// Why a slot could not be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowError {
    /// The capture already holds its maximum number of slots.
    Full,
    /// The allocator refused to hand out a bigger buffer.
    OutOfMemory,
}

impl fmt::Display for GrowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrowError::Full => f.write_str("slot buffer is full"),
            GrowError::OutOfMemory => f.write_str("out of memory growing slot buffer"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SlotBuffer {
    slots: SmallVec<[Slot; INLINE_SLOTS]>,
}

impl SlotBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    pub fn as_slice(&self) -> &[Slot] {
        &self.slots
    }

    /// Forgets all slots. Keeps the allocation.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Appends `slot` unless that would exceed `max` slots.
    pub fn push(&mut self, slot: Slot, max: usize) -> Result<(), GrowError> {
        let len = self.slots.len();
        if len >= max {
            return Err(GrowError::Full);
        }
        if len == self.slots.capacity() {
            let new_cap = (len * 2).clamp(len + 1, max);
            self.slots
                .try_grow(new_cap)
                .map_err(|_| GrowError::OutOfMemory)?;
            trace!(new_cap, "grew slot buffer");
        }
        self.slots.push(slot);
        Ok(())
    }

    /// Pushes slots from `iter` until it ends or the buffer refuses one.
    /// Returns the number of slots stored.
    pub(crate) fn fill(&mut self, iter: impl Iterator<Item = Slot>, max: usize) -> usize {
        let start = self.len();
        for slot in iter {
            match self.push(slot, max) {
                Ok(()) => {}
                Err(GrowError::Full) => break,
                Err(err @ GrowError::OutOfMemory) => {
                    warn!(len = self.len(), "truncating backtrace: {err}");
                    break;
                }
            }
        }
        self.len() - start
    }
}
