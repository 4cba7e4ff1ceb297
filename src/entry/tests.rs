use core::num::NonZeroUsize;

use super::{get_callstack, record_backtraces, stash_backtrace, stash_native_backtrace};
use crate::buffer::SlotBuffer;
use crate::context::ExecutionContext;
use crate::slot::{Backend, ExnId, Slot};
use crate::testing::{bytecode_fiber, code, frame_table, native_fiber};
use crate::walk::{BytecodeWalker, NativeWalker, RaisePoint};

fn exn(addr: usize) -> ExnId {
    ExnId::from_addr(NonZeroUsize::new(addr).unwrap())
}

#[test]
fn any_nonzero_flag_enables_recording() {
    let mut ctx = ExecutionContext::new(Backend::Interpreted);
    record_backtraces(&mut ctx, 2);
    assert!(ctx.is_recording());
    record_backtraces(&mut ctx, 0);
    assert!(!ctx.is_recording());
    record_backtraces(&mut ctx, -1);
    assert!(ctx.is_recording());
}

#[test]
fn interpreter_raise_follows_reraise_flag() {
    let mut ctx = ExecutionContext::new(Backend::Interpreted);
    let code = code();
    let fiber = bytecode_fiber(0, &[0x1010, 0x1020]);
    let e = exn(0x10);
    let first = RaisePoint { pc: 0x1004, sp: 0, trap_sp: Some(2) };
    let second = RaisePoint { pc: 0x1008, sp: 2, trap_sp: None };

    stash_backtrace(&mut ctx, e, &code, &fiber, first, false);
    assert_eq!(ctx.len(), 0);

    record_backtraces(&mut ctx, 1);
    stash_backtrace(&mut ctx, e, &code, &fiber, first, false);
    stash_backtrace(&mut ctx, e, &code, &fiber, second, true);
    assert_eq!(ctx.len(), 4);

    stash_backtrace(&mut ctx, e, &code, &fiber, second, false);
    assert_eq!(ctx.len(), 2);
}

#[test]
fn native_raise() {
    let mut ctx = ExecutionContext::new(Backend::Compiled);
    record_backtraces(&mut ctx, 1);
    let stack = [(0x4010, 2), (0x4020, 3), (0x4030, 1)];
    let frames = frame_table(&[&stack]);
    let fiber = native_fiber(&stack);
    let e = exn(0x10);
    let raise = RaisePoint { pc: 0x4010, sp: 0, trap_sp: Some(1) };

    stash_native_backtrace(&mut ctx, e, &frames, &fiber, raise);
    assert_eq!(ctx.exception_backtrace().slots(), [Slot::Compiled { return_addr: 0x4010 }]);

    // re-raise from the handler
    let raise = RaisePoint { pc: 0x4020, sp: 2, trap_sp: None };
    stash_native_backtrace(&mut ctx, e, &frames, &fiber, raise);
    assert_eq!(ctx.len(), 3);

    ctx.reset_position();
    stash_native_backtrace(&mut ctx, e, &frames, &fiber, raise);
    assert_eq!(ctx.len(), 2);
}

#[test]
fn negative_index_is_not_an_allocation() {
    let ctx = ExecutionContext::new(Backend::Interpreted);
    let code = code();
    let fiber = bytecode_fiber(0x1100, &[0x1010]);
    let mut buffer = SlotBuffer::new();

    let n = get_callstack(&ctx, BytecodeWalker::for_snapshot(&code, &fiber), 10, &mut buffer, -1);
    assert_eq!(n, 1);
    assert!(!buffer.as_slice()[0].is_alloc());

    let n = get_callstack(&ctx, BytecodeWalker::for_snapshot(&code, &fiber), 10, &mut buffer, 5);
    assert_eq!(n, 2);
    assert_eq!(
        buffer.as_slice()[0],
        Slot::Alloc { backend: Backend::Interpreted, at: 0x1100, index: 5 }
    );
}

#[test]
fn callstack_into_native_snapshot() {
    let ctx = ExecutionContext::new(Backend::Compiled);
    let stack = [(0x4010, 2), (0x4020, 1)];
    let frames = frame_table(&[&stack]);
    let fiber = native_fiber(&stack);
    let mut buffer = SlotBuffer::new();

    let n = get_callstack(&ctx, NativeWalker::for_snapshot(&frames, &fiber), 1, &mut buffer, -7);
    assert_eq!(n, 1);
    assert_eq!(buffer.as_slice(), [Slot::Compiled { return_addr: 0x4010 }]);
}

#[test]
fn large_index_is_still_an_allocation() {
    let ctx = ExecutionContext::new(Backend::Interpreted);
    let code = code();
    let fiber = bytecode_fiber(0x1100, &[0x1010]);
    let mut buffer = SlotBuffer::new();

    #[cfg(target_pointer_width = "64")]
    let indices = [1isize << 32, isize::MAX];
    #[cfg(not(target_pointer_width = "64"))]
    let indices = [isize::MAX, isize::MAX];

    for index in indices {
        let n = get_callstack(&ctx, BytecodeWalker::for_snapshot(&code, &fiber), 10, &mut buffer, index);
        assert_eq!(n, 2);
        assert_eq!(
            buffer.as_slice()[0],
            Slot::Alloc { backend: Backend::Interpreted, at: 0x1100, index: u32::MAX }
        );
    }
}
