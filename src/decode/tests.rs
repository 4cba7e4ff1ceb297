use super::{DecodedFrame, Decoder, FrameFlags};
use crate::debuginfo::{write, DebugInfoTable, EventFlags};
use crate::slot::{Backend, RawBacktrace, Slot};
use crate::testing::{event, unit};

fn table() -> DebugInfoTable {
    let units = [unit(
        Backend::Interpreted,
        0x1000,
        vec![
            event(0x10, "Main.f", 3, EventFlags::RAISE),
            event(0x20, "Main.g", 7, EventFlags::INLINED),
            event(0x30, "Main.main", 12, EventFlags::empty()),
        ],
    )];
    let table = DebugInfoTable::new();
    table.load_bytes(&write::encode(&units));
    table
}

fn backtrace(slots: &[Slot]) -> RawBacktrace {
    RawBacktrace::copy_from(Backend::Interpreted, slots)
}

fn names(frames: &[DecodedFrame]) -> Vec<Option<&str>> {
    frames.iter().map(|f| f.defname.as_deref()).collect()
}

#[test]
fn decodes_known_frames() {
    let table = table();
    let decoder = Decoder::new(Backend::Interpreted, &table);
    let bt = backtrace(&[
        Slot::Interpreted { pc: 0x1010 },
        Slot::Interpreted { pc: 0x1020 },
        Slot::Interpreted { pc: 0x1030 },
    ]);

    let frames = decoder.decode(&bt).unwrap();
    assert_eq!(names(&frames), [Some("Main.f"), Some("Main.g"), Some("Main.main")]);
    assert_eq!(frames[0].flags, FrameFlags::RAISE);
    assert_eq!(frames[1].flags, FrameFlags::INLINED);
    assert_eq!(frames[2].flags, FrameFlags::empty());
    assert_eq!(frames[2].pos.as_ref().map(|p| p.line), Some(12));
    assert!(frames.iter().all(DecodedFrame::is_known));

    // decoding is pure
    assert_eq!(decoder.decode(&bt).unwrap(), frames);
}

#[test]
fn slots_without_debug_info_are_unknown() {
    let table = table();
    let decoder = Decoder::new(Backend::Interpreted, &table);
    let bt = backtrace(&[
        Slot::Interpreted { pc: 0x1014 },
        Slot::Interpreted { pc: 0x3000 },
    ]);

    let frames = decoder.decode(&bt).unwrap();
    assert_eq!(frames.len(), 2);
    for (frame, slot) in frames.iter().zip(bt.iter()) {
        assert_eq!(frame.slot, slot);
        assert!(!frame.is_known());
        assert_eq!(frame.defname, None);
        assert_eq!(frame.flags, FrameFlags::empty());
    }
}

#[test]
fn empty_table_decodes_everything_as_unknown() {
    let table = DebugInfoTable::new();
    let decoder = Decoder::new(Backend::Interpreted, &table);
    let bt = backtrace(&[
        Slot::Interpreted { pc: 0x1010 },
        Slot::Interpreted { pc: 0x1020 },
        Slot::Interpreted { pc: 0x1030 },
    ]);

    let frames = decoder.decode(&bt).unwrap();
    assert_eq!(names(&frames), [None, None, None]);
}

#[test]
fn alloc_slot_is_flagged() {
    let table = table();
    let decoder = Decoder::new(Backend::Interpreted, &table);
    let bt = backtrace(&[
        Slot::Alloc { backend: Backend::Interpreted, at: 0x1030, index: 2 },
        Slot::Interpreted { pc: 0x1020 },
    ]);

    let frames = decoder.decode(&bt).unwrap();
    assert_eq!(frames[0].flags, FrameFlags::ALLOC);
    assert_eq!(frames[0].defname.as_deref(), Some("Main.main"));
    assert_eq!(frames[1].flags, FrameFlags::INLINED);

    let unknown = decoder
        .decode_slot(Slot::Alloc { backend: Backend::Interpreted, at: 0x1ffc, index: 0 })
        .unwrap();
    assert_eq!(unknown.flags, FrameFlags::ALLOC);
    assert!(!unknown.is_known());
}

#[test]
fn rejects_other_backend() {
    let table = table();
    let decoder = Decoder::new(Backend::Compiled, &table);

    let err = decoder.decode(&backtrace(&[Slot::Interpreted { pc: 0x1010 }])).unwrap_err();
    assert_eq!(err.expected, Backend::Compiled);
    assert_eq!(err.found, Backend::Interpreted);

    assert!(decoder.decode_slot(Slot::Interpreted { pc: 0x1010 }).is_err());
    assert!(decoder
        .decode_slot(Slot::Alloc { backend: Backend::Interpreted, at: 0x1010, index: 0 })
        .is_err());
}
