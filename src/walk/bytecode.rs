//! Walker for the bytecode interpreter.
//!
//! Interpreter frames are records on the fiber's word stack, each holding
//! the return pc of its caller. The walker scans the stack from `sp` towards
//! its old end and keeps every word that points into loaded bytecode. The
//! fragment check matters: arbitrary integers on the stack must not be
//! mistaken for frames.

use core::ops::Range;

use super::{Fiber, FrameWalker, RaisePoint};
use crate::slot::{Backend, Slot};

/// The bytecode segments currently loaded, sorted by start address.
#[derive(Debug, Clone, Default)]
pub struct CodeFragments {
    ranges: Vec<Range<usize>>,
}

impl CodeFragments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fragment. Empty ranges and ranges overlapping an existing
    /// fragment are refused.
    pub fn register(&mut self, range: Range<usize>) -> bool {
        if range.is_empty() {
            return false;
        }
        let idx = self.ranges.partition_point(|r| r.start < range.start);
        let overlaps_prev = idx > 0 && self.ranges[idx - 1].end > range.start;
        let overlaps_next = self
            .ranges
            .get(idx)
            .is_some_and(|next| next.start < range.end);
        if overlaps_prev || overlaps_next {
            debug!(?range, "refusing overlapping code fragment");
            return false;
        }
        self.ranges.insert(idx, range);
        true
    }

    pub fn contains(&self, pc: usize) -> bool {
        let idx = self.ranges.partition_point(|r| r.start <= pc);
        idx > 0 && self.ranges[idx - 1].contains(&pc)
    }
}

pub struct BytecodeWalker<'a> {
    code: &'a CodeFragments,
    fiber: Option<&'a Fiber>,
    /// Raise-point pc, reported before any stack word.
    pc: Option<usize>,
    /// Allocation-point pc, only handed out through `alloc_site`.
    alloc_pc: Option<usize>,
    sp: usize,
    end: usize,
    cross_fibers: bool,
}

impl<'a> BytecodeWalker<'a> {
    /// Walks from the raise point up to, not including, the handler.
    pub fn for_raise(code: &'a CodeFragments, fiber: &'a Fiber, raise: RaisePoint) -> Self {
        let len = fiber.words().len();
        Self {
            code,
            fiber: Some(fiber),
            pc: Some(raise.pc),
            alloc_pc: None,
            sp: raise.sp,
            end: raise.trap_sp.map_or(len, |trap| trap.min(len)),
            cross_fibers: false,
        }
    }

    /// Walks the whole logical call chain starting from the fiber's saved
    /// state. The saved pc is not a frame of its own; it is only reported as
    /// an allocation site.
    pub fn for_snapshot(code: &'a CodeFragments, fiber: &'a Fiber) -> Self {
        Self {
            code,
            fiber: Some(fiber),
            pc: None,
            alloc_pc: Some(fiber.pc()),
            sp: fiber.sp(),
            end: fiber.words().len(),
            cross_fibers: true,
        }
    }
}

impl Iterator for BytecodeWalker<'_> {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        if let Some(pc) = self.pc.take() {
            if self.code.contains(pc) {
                return Some(Slot::Interpreted { pc });
            }
        }
        loop {
            let fiber = self.fiber?;
            while self.sp < self.end {
                let word = fiber.words()[self.sp];
                self.sp += 1;
                if self.code.contains(word) {
                    return Some(Slot::Interpreted { pc: word });
                }
            }

            self.fiber = if self.cross_fibers {
                fiber.parent()
            } else {
                None
            };
            if let Some(parent) = self.fiber {
                trace!(sp = parent.sp(), "continuing in parent fiber");
                self.sp = parent.sp();
                self.end = parent.words().len();
            }
        }
    }
}

impl FrameWalker for BytecodeWalker<'_> {
    fn backend(&self) -> Backend {
        Backend::Interpreted
    }

    fn alloc_site(&mut self) -> Option<usize> {
        let code = self.code;
        self.alloc_pc.take().filter(|pc| code.contains(*pc))
    }
}
