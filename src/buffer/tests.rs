use super::{GrowError, SlotBuffer, INLINE_SLOTS};
use crate::slot::Slot;

fn slot(pc: usize) -> Slot {
    Slot::Interpreted { pc }
}

#[test]
fn short_traces_stay_inline() {
    let mut buf = SlotBuffer::new();
    for i in 0..INLINE_SLOTS {
        buf.push(slot(i), 1024).unwrap();
    }
    assert_eq!(buf.len(), INLINE_SLOTS);
    assert_eq!(buf.capacity(), INLINE_SLOTS);
}

#[test]
fn grows_geometrically() {
    let mut buf = SlotBuffer::new();
    for i in 0..=INLINE_SLOTS {
        buf.push(slot(i), 1024).unwrap();
    }
    assert_eq!(buf.capacity(), INLINE_SLOTS * 2);

    for i in 0..INLINE_SLOTS {
        buf.push(slot(i), 1024).unwrap();
    }
    assert_eq!(buf.capacity(), INLINE_SLOTS * 4);
    assert!(buf.len() <= buf.capacity());
}

#[test]
fn growth_never_exceeds_max() {
    let mut buf = SlotBuffer::new();
    let max = INLINE_SLOTS + 3;
    for i in 0..max {
        buf.push(slot(i), max).unwrap();
    }
    assert_eq!(buf.capacity(), max);
    assert_eq!(buf.push(slot(0), max), Err(GrowError::Full));
    assert_eq!(buf.len(), max);
}

#[test]
fn fill_stops_at_max() {
    let mut buf = SlotBuffer::new();
    let stored = buf.fill((0..100).map(slot), 10);
    assert_eq!(stored, 10);
    assert_eq!(buf.as_slice()[9], slot(9));
}

#[test]
fn clear_keeps_capacity() {
    let mut buf = SlotBuffer::new();
    buf.fill((0..40).map(slot), 1024);
    let cap = buf.capacity();
    buf.clear();
    assert!(buf.is_empty());
    assert_eq!(buf.capacity(), cap);
}

#[test]
fn zero_max_stores_nothing() {
    let mut buf = SlotBuffer::new();
    assert_eq!(buf.push(slot(1), 0), Err(GrowError::Full));
    assert_eq!(buf.fill((0..3).map(slot), 0), 0);
}
