//! The default backtrace printer.
//!
//! This is the printer of last resort, used when an exception terminates the
//! program before the real exception printer is up. It only needs the debug
//! info table and `core::fmt`, and writes to stderr without going through
//! std's locked, buffered handle.
//!
//! Output, one line per frame:
//! ```text
//! Raised at Main.f in file "main.ml", line 3, characters 2-14
//! Called from Main.g in file "main.ml" (inlined), line 7, characters 2-14
//! Called from unknown location
//! ```


use core::fmt;

use crate::context::{ExecutionContext, ReraisePolicy};
use crate::debuginfo::DebugInfoTable;
use crate::decode::{DecodedFrame, Decoder, FrameFlags};
use crate::slot::RawBacktrace;
use crate::stdext::LibCStderrWriter;

fn write_location(out: &mut impl fmt::Write, frame: &DecodedFrame, index: usize) -> fmt::Result {
    let raise = frame.flags.contains(FrameFlags::RAISE);

    // compiler-inserted raise
    if raise && !frame.is_known() {
        return Ok(());
    }

    let info = if frame.flags.contains(FrameFlags::ALLOC) {
        "Allocated at"
    } else if raise {
        if index == 0 {
            "Raised at"
        } else {
            "Re-raised at"
        }
    } else if index == 0 {
        "Raised by primitive operation at"
    } else {
        "Called from"
    };
    let inlined = if frame.flags.contains(FrameFlags::INLINED) {
        " (inlined)"
    } else {
        ""
    };

    match (&frame.defname, &frame.pos) {
        (Some(defname), Some(pos)) => writeln!(
            out,
            "{info} {defname} in file \"{}\"{inlined}, line {}, characters {}-{}",
            pos.file, pos.line, pos.start_char, pos.end_char
        ),
        _ => writeln!(out, "{info} unknown location{inlined}"),
    }
}

/// Writes one line per frame.
pub fn write_frames(out: &mut impl fmt::Write, frames: &[DecodedFrame]) -> fmt::Result {
    for (index, frame) in frames.iter().enumerate() {
        write_location(out, frame, index)?;
    }
    Ok(())
}

/// Decodes and writes `backtrace`. Never fails: a backtrace the table cannot
/// decode is written as unknown frames.
pub fn write_backtrace(out: &mut impl fmt::Write, backtrace: &RawBacktrace, table: &DebugInfoTable) -> fmt::Result {
    let decoder = Decoder::new(backtrace.backend(), table);
    match decoder.decode(backtrace) {
        Ok(frames) => {
            if !table.is_available() && !frames.is_empty() {
                warn!(status = ?table.status(), "no debug info, printing unknown locations");
            }
            write_frames(out, &frames)
        }
        // the decoder is built for the backtrace's own backend
        Err(err) => {
            error!("cannot decode backtrace: {err}");
            Ok(())
        }
    }
}

/// Prints the trace recorded for the context's current exception to stderr.
pub fn print_exception_backtrace<P: ReraisePolicy>(ctx: &ExecutionContext<P>, table: &DebugInfoTable) {
    let backtrace = ctx.exception_backtrace();
    if backtrace.is_empty() {
        debug!(recording = ctx.is_recording(), "no backtrace to print");
        return;
    }
    // Nothing sensible is left to do if stderr is gone.
    let _ = write_backtrace(&mut LibCStderrWriter, &backtrace, table);
}
