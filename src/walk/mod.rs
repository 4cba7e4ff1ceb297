//! Frame walkers: enumerate the live call frames of an execution context,
//! innermost first.
//!
//! There is one walker per backend. Both are plain iterators over [`Slot`]s
//! so the capture code never needs to know which engine it is looking at.
//!
//! # fibers
//! Each fiber is a separate stack segment. A fiber that was spawned from
//! another one keeps a link to that parent, and snapshot walks follow the
//! link once the child's own frames run out, so the capture covers the whole
//! logical call chain. Raise walks never leave the current fiber: the
//! exception is handled (or re-raised) before it gets to the parent.

pub mod bytecode;
pub mod native;


use std::sync::Arc;

use crate::slot::{Backend, Slot};

pub use bytecode::{BytecodeWalker, CodeFragments};
pub use native::{FrameDescr, FrameTable, NativeWalker, TRAMPOLINE_FRAME};

/// A walker over one backend's frames.
pub trait FrameWalker: Iterator<Item = Slot> {
    fn backend(&self) -> Backend;

    /// Takes the address of the allocation point this walk starts at, if it
    /// has one. Called at most once, before iteration.
    fn alloc_site(&mut self) -> Option<usize>;
}

/// Machine state at the point an exception is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaisePoint {
    pub pc: usize,
    pub sp: usize,
    /// Stack index of the innermost exception handler. `None` means the
    /// exception is not handled inside the current fiber.
    pub trap_sp: Option<usize>,
}

/// One stack segment.
///
/// `words[0]` is the youngest end of the stack; higher indices are older.
/// For a suspended fiber `pc`/`sp` are where it stopped to run its child.
#[derive(Debug, Clone)]
pub struct Fiber {
    words: Box<[usize]>,
    pc: usize,
    sp: usize,
    parent: Option<Arc<Fiber>>,
}

impl Fiber {
    pub fn new(words: impl Into<Box<[usize]>>, pc: usize, sp: usize) -> Self {
        Self {
            words: words.into(),
            pc,
            sp,
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: Arc<Fiber>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn words(&self) -> &[usize] {
        &self.words
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn sp(&self) -> usize {
        self.sp
    }

    pub fn parent(&self) -> Option<&Fiber> {
        self.parent.as_deref()
    }

    /// Number of fibers in the chain, this one included.
    pub fn depth(&self) -> usize {
        core::iter::successors(Some(self), |f| f.parent()).count()
    }
}
