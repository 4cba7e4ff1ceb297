//! Turns raw slots into symbolic frames.
//!
//! Decoding is pure: it only reads the published debug-info snapshot, and
//! loads only ever add units, so a frame that decoded once keeps decoding the
//! same way for as long as the table lives.
//! Slots without debug info decode to an unknown frame, never to an error.
//! The one thing that is an error is decoding slots of the wrong backend, as
//! their addresses would be read against the wrong code.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use bitflags::bitflags;

use crate::debuginfo::{DebugInfoTable, EventFlags, SourcePos};
use crate::slot::{Backend, BackendMismatch, RawBacktrace, Slot};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FrameFlags: u8 {
        /// The frame is at a raise, not at a call.
        const RAISE = 1 << 0;
        const INLINED = 1 << 1;
        /// The frame is the allocation point of an allocation capture.
        const ALLOC = 1 << 2;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub slot: Slot,
    /// Name of the enclosing function. `None` if the slot has no debug info.
    pub defname: Option<Arc<str>>,
    pub pos: Option<SourcePos>,
    pub flags: FrameFlags,
}

impl DecodedFrame {
    fn unknown(slot: Slot) -> Self {
        Self {
            slot,
            defname: None,
            pos: None,
            flags: FrameFlags::empty(),
        }
    }

    /// Whether the frame has a source position.
    pub fn is_known(&self) -> bool {
        self.pos.is_some()
    }
}

pub struct Decoder<'a> {
    backend: Backend,
    table: &'a DebugInfoTable,
}

impl<'a> Decoder<'a> {
    pub fn new(backend: Backend, table: &'a DebugInfoTable) -> Self {
        Self { backend, table }
    }

    pub fn decode_slot(&self, slot: Slot) -> Result<DecodedFrame, BackendMismatch> {
        self.backend.check(slot.backend())?;

        let mut frame = match self.table.lookup(self.backend, slot.addr()) {
            Some(event) => DecodedFrame {
                slot,
                defname: Some(event.defname),
                pos: event.pos,
                flags: frame_flags(event.flags),
            },
            None => DecodedFrame::unknown(slot),
        };
        if slot.is_alloc() {
            frame.flags.insert(FrameFlags::ALLOC);
        }
        Ok(frame)
    }

    /// Decodes every slot, in order.
    #[instrument(level = "debug", skip_all, fields(len = backtrace.len()))]
    pub fn decode(&self, backtrace: &RawBacktrace) -> Result<Vec<DecodedFrame>, BackendMismatch> {
        self.backend.check(backtrace.backend())?;
        backtrace.iter().map(|slot| self.decode_slot(slot)).collect()
    }
}

fn frame_flags(event: EventFlags) -> FrameFlags {
    let mut flags = FrameFlags::empty();
    flags.set(FrameFlags::RAISE, event.contains(EventFlags::RAISE));
    flags.set(FrameFlags::INLINED, event.contains(EventFlags::INLINED));
    flags
}
