use env_logger::Env;
use std::fmt::Write;

const ROW_LEN: usize = 16;
const REPEAT_MARKER: &str =
    "          .. .. .. .. .. .. .. .. : .. .. .. .. .. .. .. ..\n";

/// set up the env_logger backend, `RUST_LOG` overrides `default_filter`
pub fn init_logger(default_filter: &str) {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .try_init();
}

/// Classic 16-column hex dump with an ASCII gutter.
///
/// Each row starts with its offset, a ` :` splits the two groups of eight,
/// and a run of identical full rows after the first is folded into one dotted
/// line. A final line carries the total length.
pub fn hex_dump(buf: &[u8]) -> String {
    let mut out = String::new();
    let rows: Vec<&[u8]> = buf.chunks(ROW_LEN).collect();
    let (last, full) = match rows.split_last() {
        Some((last, full)) => (*last, full),
        None => (&[][..], &[][..]),
    };

    // No previous row yet, so a leading all-zero row is printed, not folded.
    let mut previous: Option<&[u8]> = None;
    let mut folding = false;
    for (index, row) in full.iter().enumerate() {
        if previous == Some(*row) {
            if !folding {
                folding = true;
                out.push_str(REPEAT_MARKER);
            }
        } else {
            folding = false;
            dump_row(&mut out, index * ROW_LEN, row);
        }
        previous = Some(*row);
    }

    dump_row(&mut out, full.len() * ROW_LEN, last);
    if !last.is_empty() {
        let _ = writeln!(out, "{:08X}:", buf.len());
    }
    out
}

fn dump_row(out: &mut String, offset: usize, row: &[u8]) {
    let _ = write!(out, "{:08X}:", offset);

    if !row.is_empty() {
        for column in 0..ROW_LEN {
            if column == ROW_LEN / 2 {
                out.push_str(" :");
            }
            match row.get(column) {
                Some(byte) => {
                    let _ = write!(out, " {:02X}", byte);
                }
                None => out.push_str("   "),
            }
        }
        out.push_str("  ");
        for &byte in row {
            out.push(if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '.'
            });
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_is_a_single_offset() {
        assert_eq!(hex_dump(&[]), "00000000:\n");
    }

    #[test]
    fn short_row_is_padded() {
        let expected = format!(
            "00000000: 48 65 6C 6C 6F{} :{}  Hello\n00000005:\n",
            "   ".repeat(3),
            "   ".repeat(8)
        );
        assert_eq!(hex_dump(b"Hello"), expected);
    }

    #[test]
    fn non_printable_bytes_become_dots() {
        let dump = hex_dump(&[0x00, b'a', 0x7F, b' ', 0xFF]);
        assert!(dump.starts_with("00000000: 00 61 7F 20 FF"));
        assert!(dump.contains("  .a. .\n"));
    }

    #[test]
    fn full_row_has_separator_after_eight_bytes() {
        let bytes: Vec<u8> = (0x41..0x51).collect();
        let dump = hex_dump(&bytes);
        let first = dump.lines().next().unwrap();
        assert_eq!(
            first,
            "00000000: 41 42 43 44 45 46 47 48 : 49 4A 4B 4C 4D 4E 4F 50  ABCDEFGHIJKLMNOP"
        );
        assert_eq!(dump.lines().last(), Some("00000010:"));
    }

    #[test]
    fn repeated_rows_are_folded() {
        let mut bytes = vec![0u8; 64];
        bytes.extend_from_slice(b"tail");
        let dump = hex_dump(&bytes);
        let lines: Vec<&str> = dump.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("00000000: 00 00"));
        assert_eq!(format!("{}\n", lines[1]), REPEAT_MARKER);
        assert!(lines[2].starts_with("00000040: 74 61 69 6C"));
        assert_eq!(lines[3], "00000044:");
    }

    #[test]
    fn leading_zero_row_is_printed() {
        let dump = hex_dump(&[0u8; 20]);
        assert!(dump.starts_with("00000000: 00 00 00 00"));
        assert!(!dump.contains(REPEAT_MARKER));
    }

    #[test]
    fn fold_resets_when_rows_change() {
        let mut bytes = vec![1u8; 48];
        bytes.extend(vec![2u8; 32]);
        bytes.push(3);
        let dump = hex_dump(&bytes);
        assert_eq!(dump.matches(REPEAT_MARKER).count(), 2);
        assert!(dump.contains("00000030: 02 02"));
    }
}
