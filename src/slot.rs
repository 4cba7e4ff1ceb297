//! Opaque frame identifiers and the frozen sequences built from them.
//!
//! A [`Slot`] is only meaningful inside the process image that produced it.
//! Neither slots nor [`RawBacktrace`]s are a stable format: do not write them
//! to disk or send them to another process.

use core::fmt;
use core::num::NonZeroUsize;

/// The execution engine whose frames a slot describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// The threaded bytecode interpreter.
    Interpreted,
    /// Compiled native code.
    Compiled,
}

impl Backend {
    pub(crate) fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Backend::Interpreted),
            1 => Some(Backend::Compiled),
            _ => None,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Backend::Interpreted => 0,
            Backend::Compiled => 1,
        }
    }

    pub(crate) fn check(self, found: Backend) -> Result<(), BackendMismatch> {
        if self == found {
            Ok(())
        } else {
            Err(BackendMismatch {
                expected: self,
                found,
            })
        }
    }
}

/// Identity of an exception value.
///
/// This is a weak reference: it remembers where the value lived and nothing
/// else, so it neither keeps the value alive nor can it be dereferenced.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExnId(NonZeroUsize);

impl ExnId {
    pub fn from_addr(addr: NonZeroUsize) -> Self {
        Self(addr)
    }

    /// Identity of the value behind `value`.
    pub fn of<T: ?Sized>(value: &T) -> Self {
        let addr = (value as *const T).cast::<u8>() as usize;
        // references are never null
        Self(NonZeroUsize::new(addr).unwrap_or(NonZeroUsize::MIN))
    }

    pub fn addr(self) -> usize {
        self.0.get()
    }
}

impl fmt::Debug for ExnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExnId({:#x})", self.0)
    }
}

/// One captured call frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// A bytecode code pointer: the return pc of an interpreted frame.
    Interpreted { pc: usize },
    /// A return address into compiled code.
    Compiled { return_addr: usize },
    /// The allocation point of an allocation capture. Only ever slot 0.
    Alloc {
        backend: Backend,
        at: usize,
        index: u32,
    },
}

impl Slot {
    pub fn backend(&self) -> Backend {
        match *self {
            Slot::Interpreted { .. } => Backend::Interpreted,
            Slot::Compiled { .. } => Backend::Compiled,
            Slot::Alloc { backend, .. } => backend,
        }
    }

    /// The code address this slot points at.
    pub fn addr(&self) -> usize {
        match *self {
            Slot::Interpreted { pc } => pc,
            Slot::Compiled { return_addr } => return_addr,
            Slot::Alloc { at, .. } => at,
        }
    }

    pub fn is_alloc(&self) -> bool {
        matches!(self, Slot::Alloc { .. })
    }
}

/// A frozen, innermost-first sequence of slots from one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBacktrace {
    backend: Backend,
    slots: Box<[Slot]>,
}

impl RawBacktrace {
    /// Copies `slots` out. Every slot must come from `backend`, and only slot 0
    /// may be an allocation point.
    pub(crate) fn copy_from(backend: Backend, slots: &[Slot]) -> Self {
        debug_assert!(slots.iter().all(|s| s.backend() == backend));
        debug_assert!(slots.iter().skip(1).all(|s| !s.is_alloc()));
        Self {
            backend,
            slots: slots.into(),
        }
    }

    pub fn empty(backend: Backend) -> Self {
        Self {
            backend,
            slots: Box::new([]),
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether slot 0 is the allocation point of an allocation capture.
    pub fn is_alloc_capture(&self) -> bool {
        self.slots.first().is_some_and(Slot::is_alloc)
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn get(&self, index: usize) -> Option<Slot> {
        self.slots.get(index).copied()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = Slot> + '_ {
        self.slots.iter().copied()
    }
}

/// Slots of one backend were handed to code expecting another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendMismatch {
    pub expected: Backend,
    pub found: Backend,
}

impl fmt::Display for BackendMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {:?} frames, found {:?} frames",
            self.expected, self.found
        )
    }
}
