//! Walker for compiled code.
//!
//! Compiled frames carry no links. Instead the compiler emits a frame table:
//! for every return address, the size of the frame the callee returns into.
//! Starting from a `(pc, sp)` pair, we look up the frame of `pc`, step `sp`
//! over it and read the caller's return address from the last word of the
//! frame. That repeats until we hit code without a descriptor, a null return
//! address, or the runtime trampoline that marks the bottom of the fiber.

use super::{Fiber, FrameWalker, RaisePoint};
use crate::slot::{Backend, Slot};

/// Frame size of the descriptor for the runtime trampoline. Reaching it
/// ends the fiber.
pub const TRAMPOLINE_FRAME: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescr {
    pub retaddr: usize,
    /// In words. Includes the return address slot.
    pub frame_size: u16,
}

impl FrameDescr {
    pub fn is_trampoline(&self) -> bool {
        self.frame_size == TRAMPOLINE_FRAME
    }
}

/// Frame descriptors sorted by return address.
#[derive(Debug, Clone, Default)]
pub struct FrameTable {
    descrs: Vec<FrameDescr>,
}

impl FrameTable {
    /// Builds the table from descriptors in any order. A return address
    /// described twice keeps its first descriptor.
    pub fn new(mut descrs: Vec<FrameDescr>) -> Self {
        descrs.sort_by_key(|d| d.retaddr);
        let before = descrs.len();
        descrs.dedup_by_key(|d| d.retaddr);
        if descrs.len() != before {
            warn!(
                dropped = before - descrs.len(),
                "frame table has duplicate return addresses"
            );
        }
        Self { descrs }
    }

    pub fn len(&self) -> usize {
        self.descrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descrs.is_empty()
    }

    pub fn find(&self, pc: usize) -> Option<&FrameDescr> {
        let idx = self.descrs.binary_search_by_key(&pc, |d| d.retaddr).ok()?;
        Some(&self.descrs[idx])
    }
}

pub struct NativeWalker<'a> {
    frames: &'a FrameTable,
    fiber: Option<&'a Fiber>,
    pc: usize,
    sp: usize,
    trap_sp: Option<usize>,
    cross_fibers: bool,
}

impl<'a> NativeWalker<'a> {
    /// Walks from the raise point and stops once a frame takes `sp` past the
    /// handler.
    pub fn for_raise(frames: &'a FrameTable, fiber: &'a Fiber, raise: RaisePoint) -> Self {
        Self {
            frames,
            fiber: Some(fiber),
            pc: raise.pc,
            sp: raise.sp,
            trap_sp: raise.trap_sp,
            cross_fibers: false,
        }
    }

    pub fn for_snapshot(frames: &'a FrameTable, fiber: &'a Fiber) -> Self {
        Self {
            frames,
            fiber: Some(fiber),
            pc: fiber.pc(),
            sp: fiber.sp(),
            trap_sp: None,
            cross_fibers: true,
        }
    }

    /// Steps over the frame of `self.pc`. Returns that pc, or `None` once the
    /// fiber has no frames left.
    fn step(&mut self, fiber: &Fiber) -> Option<usize> {
        let pc = self.pc;
        if pc == 0 {
            return None;
        }
        let Some(descr) = self.frames.find(pc) else {
            trace!("no frame descriptor for {pc:#x}");
            return None;
        };
        if descr.is_trampoline() {
            return None;
        }
        if descr.frame_size == 0 {
            debug!("empty frame at {pc:#x}");
            return None;
        }

        let Some(sp) = self.sp.checked_add(usize::from(descr.frame_size)) else {
            debug!(sp = self.sp, "frame runs off the address space");
            return None;
        };
        let words = fiber.words();
        self.sp = sp;
        self.pc = match sp.checked_sub(1).and_then(|i| words.get(i)) {
            Some(&retaddr) => retaddr,
            None => {
                debug!(sp, len = words.len(), "frame runs off the stack");
                0
            }
        };
        Some(pc)
    }
}

impl Iterator for NativeWalker<'_> {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        loop {
            let fiber = self.fiber?;
            if let Some(return_addr) = self.step(fiber) {
                if self.trap_sp.is_some_and(|trap| self.sp > trap) {
                    self.fiber = None;
                }
                return Some(Slot::Compiled { return_addr });
            }

            self.fiber = if self.cross_fibers {
                fiber.parent()
            } else {
                None
            };
            if let Some(parent) = self.fiber {
                trace!(sp = parent.sp(), "continuing in parent fiber");
                self.pc = parent.pc();
                self.sp = parent.sp();
            }
        }
    }
}

impl FrameWalker for NativeWalker<'_> {
    fn backend(&self) -> Backend {
        Backend::Compiled
    }

    /// The allocation point is the innermost frame itself.
    fn alloc_site(&mut self) -> Option<usize> {
        self.next().map(|slot| slot.addr())
    }
}
