//! Stack and table builders shared by the unit tests.

use std::sync::Arc;

use crate::debuginfo::{CodeUnit, DebugEvent, EventFlags, SourcePos};
use crate::slot::Backend;
use crate::walk::{CodeFragments, Fiber, FrameDescr, FrameTable, TRAMPOLINE_FRAME};

/// Where the bytecode of the test programs lives.
pub(crate) const BYTECODE: core::ops::Range<usize> = 0x1000..0x2000;

/// Return address of the runtime trampoline in the native tests.
pub(crate) const TRAMPOLINE: usize = 0x9000;

/// Filler for stack words that are not return addresses.
const JUNK: usize = 0xdead;

pub(crate) fn code() -> CodeFragments {
    let mut code = CodeFragments::new();
    assert!(code.register(BYTECODE));
    code
}

/// An interpreter stack whose code pointers are `pcs` (innermost first),
/// each preceded by one junk word.
pub(crate) fn bytecode_fiber(pc: usize, pcs: &[usize]) -> Fiber {
    let words: Vec<usize> = pcs.iter().flat_map(|&pc| [JUNK, pc]).collect();
    Fiber::new(words, pc, 0)
}

pub(crate) fn bytecode_child(pc: usize, pcs: &[usize], parent: Fiber) -> Fiber {
    bytecode_fiber(pc, pcs).with_parent(Arc::new(parent))
}

/// Lays out compiled frames `(return address, size in words)`, innermost
/// first. The last word of each frame holds the caller's return address;
/// the outermost frame returns into the trampoline.
pub(crate) fn native_words(frames: &[(usize, u16)]) -> Vec<usize> {
    let mut words = Vec::new();
    for (i, &(_, size)) in frames.iter().enumerate() {
        let ret = frames.get(i + 1).map_or(TRAMPOLINE, |f| f.0);
        words.extend(core::iter::repeat(JUNK).take(usize::from(size) - 1));
        words.push(ret);
    }
    words
}

pub(crate) fn native_fiber(frames: &[(usize, u16)]) -> Fiber {
    Fiber::new(native_words(frames), frames.first().map_or(0, |f| f.0), 0)
}

/// A frame table describing every frame in `stacks` plus the trampoline.
pub(crate) fn frame_table(stacks: &[&[(usize, u16)]]) -> FrameTable {
    let mut descrs: Vec<FrameDescr> = stacks
        .iter()
        .flat_map(|s| s.iter())
        .map(|&(retaddr, frame_size)| FrameDescr {
            retaddr,
            frame_size,
        })
        .collect();
    descrs.push(FrameDescr {
        retaddr: TRAMPOLINE,
        frame_size: TRAMPOLINE_FRAME,
    });
    FrameTable::new(descrs)
}

pub(crate) fn event(offset: usize, defname: &str, line: u32, flags: EventFlags) -> DebugEvent {
    DebugEvent {
        offset,
        defname: Arc::from(defname),
        pos: Some(SourcePos {
            file: Arc::from("main.ml"),
            line,
            start_char: 2,
            end_char: 14,
        }),
        flags,
    }
}

pub(crate) fn unit(backend: Backend, base: usize, events: Vec<DebugEvent>) -> CodeUnit {
    CodeUnit {
        name: "main".into(),
        backend,
        base,
        size: 0x1000,
        events: events.into(),
    }
}
