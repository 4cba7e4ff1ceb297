//! Writes debug-info files in the format the table reads.

use std::io;
use std::path::Path;

use super::parse::{MAGIC, VERSION};
use super::CodeUnit;

fn write_uleb128(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0b0111_1111) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0b1000_0000);
    }
}

fn write_sleb128(out: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0b0111_1111) as u8;
        value >>= 7;
        let sign_bit_set = (byte & 0b0100_0000) != 0;
        if (value == 0 && !sign_bit_set) || (value == -1 && sign_bit_set) {
            out.push(byte);
            return;
        }
        out.push(byte | 0b1000_0000);
    }
}

fn write_cstr(out: &mut Vec<u8>, s: &str) {
    debug_assert!(!s.contains('\0'));
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Encodes `units`. Events of each unit must be sorted by offset.
pub fn encode(units: &[CodeUnit]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    write_uleb128(&mut out, units.len() as u64);

    for unit in units {
        write_cstr(&mut out, &unit.name);
        out.push(unit.backend.as_u8());
        write_uleb128(&mut out, unit.base as u64);
        write_uleb128(&mut out, unit.size as u64);
        write_uleb128(&mut out, unit.events.len() as u64);

        let mut offset = 0;
        let mut line = 0i64;
        for event in unit.events.iter() {
            debug_assert!(event.offset >= offset);
            write_uleb128(&mut out, (event.offset - offset) as u64);
            offset = event.offset;

            write_cstr(&mut out, &event.defname);
            match &event.pos {
                Some(pos) => {
                    write_cstr(&mut out, &pos.file);
                    write_sleb128(&mut out, i64::from(pos.line) - line);
                    line = i64::from(pos.line);
                    write_uleb128(&mut out, u64::from(pos.start_char));
                    write_uleb128(&mut out, u64::from(pos.end_char));
                }
                None => {
                    write_cstr(&mut out, "");
                    write_sleb128(&mut out, 0);
                    write_uleb128(&mut out, 0);
                    write_uleb128(&mut out, 0);
                }
            }
            out.push(event.flags.bits());
        }
    }
    out
}

pub fn write_file(path: &Path, units: &[CodeUnit]) -> io::Result<()> {
    std::fs::write(path, encode(units))
}

#[cfg(test)]
mod tests {
    use super::{write_sleb128, write_uleb128};

    #[test]
    fn leb128_examples() {
        let mut out = Vec::new();
        write_uleb128(&mut out, 624485);
        assert_eq!(out, [0xe5, 0x8e, 0x26]);

        out.clear();
        write_uleb128(&mut out, 127);
        assert_eq!(out, [0x7f]);

        out.clear();
        write_sleb128(&mut out, -123456);
        assert_eq!(out, [0xc0, 0xbb, 0x78]);

        out.clear();
        write_sleb128(&mut out, -1);
        assert_eq!(out, [0x7f]);

        out.clear();
        write_sleb128(&mut out, 64);
        assert_eq!(out, [0xc0, 0x00]);
    }
}
