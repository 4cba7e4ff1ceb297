//! Implements parsing of the debug-info file.
//!
//! The file lists code units. Each unit covers one contiguous code range and
//! carries a list of debug events, one for every code address a frame can
//! point at (return addresses, raise points), sorted by offset:
//! ```text
//! OFFSET DEFNAME FILE LINE CHARS FLAGS
//! E0
//! E1
//! ...
//! EN
//! ```
//!
//! Offsets and lines are stored as deltas from the previous event, which
//! keeps them to a byte or two each. Integers use the DWARF LEB128 encodings.
//! Strings are NUL-terminated UTF-8.


use core::ffi::CStr;
use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use super::{CodeUnit, DebugEvent, EventFlags, SourcePos};
use crate::slot::Backend;

pub(super) const MAGIC: &[u8; 4] = b"STDI";
pub(super) const VERSION: u8 = 1;

/// The debug-info file is invalid.
#[derive(Debug, PartialEq)]
pub struct Error(String);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type Result<T, E = Error> = core::result::Result<T, E>;

struct Cursor<'a>(&'a [u8]);

fn read_bytes<'a>(data: &mut Cursor<'a>, amount: usize) -> Result<&'a [u8]> {
    if data.0.len() < amount {
        Err(Error(format!(
            "index out of bounds, tried to read {amount} bytes from {}",
            data.0.len()
        )))
    } else {
        let (result, rest) = data.0.split_at(amount);
        data.0 = rest;
        Ok(result)
    }
}
fn read_u8(data: &mut Cursor<'_>) -> Result<u8> {
    let int = read_bytes(data, 1)?;
    Ok(int[0])
}
fn read_utf8_cstr<'a>(data: &mut Cursor<'a>) -> Result<&'a str> {
    let cstr: &CStr = CStr::from_bytes_until_nul(data.0)
        .map_err(|_| Error("no null terminator found for string".into()))?;
    let utf8 = cstr
        .to_str()
        .map_err(|e| Error(format!("invalid utf8: {e:?}")))?;
    data.0 = &data.0[(utf8.len() + 1)..];
    Ok(utf8)
}
fn read_uleb128(data: &mut Cursor<'_>) -> Result<u64> {
    let mut result = 0;
    let mut shift = 0;
    loop {
        let byte = read_u8(data)?;
        if shift >= 64 || (shift == 63 && (byte & 0b0111_1110) != 0) {
            return Err(Error("uleb128 does not fit in 64 bits".into()));
        }
        result |= u64::from(byte & 0b0111_1111) << shift;
        if (byte >> 7) == 0 {
            break;
        }
        shift += 7;
    }
    Ok(result)
}
fn read_ileb128(data: &mut Cursor<'_>) -> Result<i64> {
    let mut result = 0;
    let mut shift = 0;

    let sign_bit_set = loop {
        let byte = read_u8(data)?;
        if shift >= 64 {
            return Err(Error("sleb128 does not fit in 64 bits".into()));
        }
        result |= i64::from(byte & 0b0111_1111) << shift;
        shift += 7;
        if (byte >> 7) == 0 {
            break ((byte >> 6) & 1) == 1;
        }
    };
    if shift < 64 && sign_bit_set {
        result |= -1 << shift;
    }
    Ok(result)
}
fn read_usize(data: &mut Cursor<'_>, what: &str) -> Result<usize> {
    let v = read_uleb128(data)?;
    usize::try_from(v).map_err(|_| Error(format!("{what} out of range: {v}")))
}
fn read_u32(data: &mut Cursor<'_>, what: &str) -> Result<u32> {
    let v = read_uleb128(data)?;
    u32::try_from(v).map_err(|_| Error(format!("{what} out of range: {v}")))
}

/// Shares identical names between the events of a unit.
#[derive(Default)]
struct Interner(HashMap<Box<str>, Arc<str>>);

impl Interner {
    fn intern(&mut self, s: &str) -> Arc<str> {
        if let Some(shared) = self.0.get(s) {
            return shared.clone();
        }
        let shared: Arc<str> = Arc::from(s);
        self.0.insert(s.into(), shared.clone());
        shared
    }
}

/// Parses a whole debug-info file. Units come back sorted by base address.
#[instrument(skip(data), fields(len = data.len()))]
pub(super) fn parse_debug_info(data: &[u8]) -> Result<Vec<CodeUnit>> {
    let data = &mut Cursor(data);

    let magic = read_bytes(data, MAGIC.len())?;
    if magic != MAGIC {
        return Err(Error(format!("bad magic: {magic:x?}")));
    }
    let version = read_u8(data)?;
    if version != VERSION {
        return Err(Error(format!("version must be {VERSION}: {version}")));
    }

    let count = read_usize(data, "unit count")?;
    let mut units = Vec::with_capacity(count.min(data.0.len()));
    let mut names = Interner::default();
    for _ in 0..count {
        units.push(parse_unit(data, &mut names)?);
    }
    if !data.0.is_empty() {
        return Err(Error(format!("{} trailing bytes", data.0.len())));
    }

    units.sort_by_key(|u| u.base);
    for pair in units.windows(2) {
        if pair[0].base + pair[0].size > pair[1].base {
            return Err(Error(format!(
                "code units {:?} and {:?} overlap",
                pair[0].name, pair[1].name
            )));
        }
    }

    debug!(units = units.len(), "parsed debug info");
    Ok(units)
}

fn parse_unit(data: &mut Cursor<'_>, names: &mut Interner) -> Result<CodeUnit> {
    let name = read_utf8_cstr(data)?;
    let backend = read_u8(data)?;
    let backend =
        Backend::from_u8(backend).ok_or_else(|| Error(format!("invalid backend: {backend}")))?;
    let base = read_usize(data, "unit base")?;
    let size = read_usize(data, "unit size")?;
    if base.checked_add(size).is_none() {
        return Err(Error(format!("unit {name:?} wraps the address space")));
    }

    let count = read_usize(data, "event count")?;
    let mut events = Vec::with_capacity(count.min(data.0.len()));
    let mut offset = 0usize;
    let mut line = 0i64;
    for i in 0..count {
        let delta = read_usize(data, "offset delta")?;
        if i > 0 && delta == 0 {
            return Err(Error(format!("unit {name:?}: event offsets must increase")));
        }
        offset = offset
            .checked_add(delta)
            .filter(|&o| o < size)
            .ok_or_else(|| Error(format!("unit {name:?}: event outside of unit")))?;

        let defname = names.intern(read_utf8_cstr(data)?);
        let file = read_utf8_cstr(data)?;
        line = line
            .checked_add(read_ileb128(data)?)
            .ok_or_else(|| Error("line delta overflows".into()))?;
        let line_no =
            u32::try_from(line).map_err(|_| Error(format!("line out of range: {line}")))?;
        let start_char = read_u32(data, "start char")?;
        let end_char = read_u32(data, "end char")?;
        if end_char < start_char {
            return Err(Error(format!("characters {start_char}-{end_char} are reversed")));
        }
        let flags = read_u8(data)?;
        let flags = EventFlags::from_bits(flags)
            .ok_or_else(|| Error(format!("invalid event flags: {flags:#x}")))?;

        let pos = (!file.is_empty()).then(|| SourcePos {
            file: names.intern(file),
            line: line_no,
            start_char,
            end_char,
        });
        events.push(DebugEvent {
            offset,
            defname,
            pos,
            flags,
        });
    }

    trace!(name, ?backend, base, size, events = events.len(), "code unit");
    Ok(CodeUnit {
        name: name.into(),
        backend,
        base,
        size,
        events: events.into(),
    })
}
