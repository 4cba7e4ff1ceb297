//! Entry points called by the runtime: the interpreter loop, compiled-code
//! raise stubs, startup and fatal-error handling.
//!
//! These are thin adapters that keep the runtime's calling conventions (an
//! `int` flag, a signed allocation index) out of the rest of the crate.

#[cfg(test)]
mod tests;

use core::ffi::c_int;
use std::path::Path;

use crate::buffer::SlotBuffer;
use crate::config::Config;
use crate::context::{ExecutionContext, ReraisePolicy};
use crate::debuginfo::{DebugInfoStatus, DebugInfoTable};
use crate::print;
use crate::slot::ExnId;
use crate::walk::{BytecodeWalker, CodeFragments, Fiber, FrameTable, FrameWalker, NativeWalker, RaisePoint};

/// Turns recording on for any non-zero `enabled`. Callable during startup,
/// before the managed heap exists.
pub fn record_backtraces<P: ReraisePolicy>(ctx: &mut ExecutionContext<P>, enabled: c_int) {
    ctx.set_recording(enabled != 0);
}

/// Called by the interpreter at every raise. `reraise` says whether this
/// raise propagates an exception that is already in flight.
pub fn stash_backtrace<P: ReraisePolicy>(
    ctx: &mut ExecutionContext<P>,
    exn: ExnId,
    code: &CodeFragments,
    fiber: &Fiber,
    raise: RaisePoint,
    reraise: bool,
) {
    if !ctx.is_recording() {
        return;
    }
    ctx.stash(exn, BytecodeWalker::for_raise(code, fiber, raise), Some(reraise));
}

/// Called by compiled code at every raise. A fresh raise has already reset
/// the position with [`ExecutionContext::reset_position`].
pub fn stash_native_backtrace<P: ReraisePolicy>(
    ctx: &mut ExecutionContext<P>,
    exn: ExnId,
    frames: &FrameTable,
    fiber: &Fiber,
    raise: RaisePoint,
) {
    if !ctx.is_recording() {
        return;
    }
    ctx.stash(exn, NativeWalker::for_raise(frames, fiber, raise), None);
}

/// Captures up to `max_slots` frames into `buffer`. A non-negative
/// `alloc_index` marks an allocation capture; indices past `u32::MAX` are
/// stored as `u32::MAX`.
pub fn get_callstack<P: ReraisePolicy, W: FrameWalker>(
    ctx: &ExecutionContext<P>,
    walker: W,
    max_slots: usize,
    buffer: &mut SlotBuffer,
    alloc_index: isize,
) -> usize {
    let alloc_index = (alloc_index >= 0).then(|| u32::try_from(alloc_index).unwrap_or(u32::MAX));
    ctx.get_callstack(walker, max_slots, buffer, alloc_index)
}

/// Adds the debug info in `path` to the process-wide table. Each file is
/// read at most once.
pub fn load_debug_info(path: &Path) -> DebugInfoStatus {
    DebugInfoTable::global().load(Some(path))
}

/// Loads the program's debug info from wherever the configuration says.
pub fn init_debug_info(config: &Config) -> DebugInfoStatus {
    DebugInfoTable::global().load(config.debug_info_path.as_deref())
}

/// Prints the context's exception backtrace to stderr.
pub fn print_exception_backtrace<P: ReraisePolicy>(ctx: &ExecutionContext<P>) {
    print::print_exception_backtrace(ctx, DebugInfoTable::global());
}
