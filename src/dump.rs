//! Hex dumps of encoded buffers, for debugging and test failure messages.

use std::fmt::Write;

const BYTES_PER_LINE: usize = 16;

/// Formats `bytes` as offset, hex and printable ASCII columns, 16 bytes per line.
///
/// ```rust
/// let dump = bstream::dump::hex_dump(b"bstream\x00");
/// assert_eq!(
///     dump,
///     "00000000: 62 73 74 72 65 61 6d 00                          bstream.\n"
/// );
/// ```
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() / BYTES_PER_LINE + 1) * 76);
    for (line, chunk) in bytes.chunks(BYTES_PER_LINE).enumerate() {
        let _ = write!(out, "{:08x}: ", line * BYTES_PER_LINE);
        for byte in chunk {
            let _ = write!(out, "{:02x} ", byte);
        }
        for _ in chunk.len()..BYTES_PER_LINE {
            out.push_str("   ");
        }
        out.push(' ');
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_dumps_nothing() {
        assert_eq!(hex_dump(&[]), "");
    }

    #[test]
    fn full_lines_wrap_at_sixteen_bytes() {
        let bytes: Vec<u8> = (0x41..0x41 + 17).collect();
        let dump = hex_dump(&bytes);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "00000000: 41 42 43 44 45 46 47 48 49 4a 4b 4c 4d 4e 4f 50  ABCDEFGHIJKLMNOP"
        );
        assert!(lines[1].starts_with("00000010: 51 "));
        assert!(lines[1].ends_with(" Q"));
    }
}
