//! PAX extended header records.
//!
//! Only the `path` key is honoured; every other record is skipped.

use bstr::{BString, ByteSlice};

use super::ArchiveError;

const PATH_KEY: &[u8] = b"path";

/// Extract the `path` value from a PAX extended header payload.
///
/// Records may carry the POSIX decimal length prefix (`"30 path=...\n"`) or be
/// bare `key=value` lines. A value runs up to its record's newline.
pub fn long_path(blob: &[u8]) -> Result<BString, ArchiveError> {
    let mut rest = blob;
    while !rest.is_empty() {
        let (record, terminated, tail) = next_record(rest);
        if let Some((key, value)) = record.split_once_str("=") {
            if key == PATH_KEY {
                if !terminated {
                    return Err(ArchiveError::ExtendedHeader("unterminated path record"));
                }
                return Ok(BString::from(value));
            }
        }
        rest = tail;
    }
    Err(ArchiveError::ExtendedHeader("missing path record"))
}

/// Split off the first record, returning `(key=value, newline_seen, remainder)`.
fn next_record(input: &[u8]) -> (&[u8], bool, &[u8]) {
    if let Some((body, tail)) = length_prefixed(input) {
        return (body, true, tail);
    }
    let (line, terminated, tail) = match input.find_byte(b'\n') {
        Some(end) => (&input[..end], true, &input[end + 1..]),
        None => (input, false, &input[input.len()..]),
    };
    (strip_length(line), terminated, tail)
}

/// Parse a well-formed `"<len> key=value\n"` record.
fn length_prefixed(input: &[u8]) -> Option<(&[u8], &[u8])> {
    let space = input.find_byte(b' ')?;
    let len: usize = input[..space].to_str().ok()?.parse().ok()?;
    if len <= space + 1 || len > input.len() || input[len - 1] != b'\n' {
        return None;
    }
    Some((&input[space + 1..len - 1], &input[len..]))
}

fn strip_length(line: &[u8]) -> &[u8] {
    match line.find_byte(b' ') {
        Some(space) if space > 0 && line[..space].iter().all(u8::is_ascii_digit) => {
            &line[space + 1..]
        }
        _ => line,
    }
}
