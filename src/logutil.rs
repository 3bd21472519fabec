//! Logging helpers that keep frame dumps on a single line.
//!
//! Frame data may carry the newline sentinel and arbitrary ASCII; these helpers
//! escape it so a status line or log record never wraps.

use std::fmt::Write;

/// Cap on how many characters of a payload end up in one log line.
const MAX_PREVIEW: usize = 300;

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
/// - other control characters => `\xNN`
///
/// Strings longer than the preview cap end with an ellipsis.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        push_escaped(&mut out, ch);
    }
    out
}

/// Render raw wire bytes the way a frame is written down: bit units as `0`/`1`,
/// anything else as its (escaped) character.
pub fn wire_preview(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().min(MAX_PREVIEW) + 8);
    for (count, &b) in bytes.iter().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match b {
            0 => out.push('0'),
            1 => out.push('1'),
            other => push_escaped(&mut out, other as char),
        }
    }
    out
}

fn push_escaped(out: &mut String, ch: char) {
    match ch {
        '\\' => out.push_str("\\\\"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        c if c.is_control() => {
            let _ = write!(out, "\\x{:02X}", c as u32);
        }
        c => out.push(c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_newlines_and_truncates() {
        assert_eq!(escape_log("Line1\nLine2\r\tEnd"), "Line1\\nLine2\\r\\tEnd");
        let long = "1".repeat(400);
        let esc = escape_log(&long);
        assert_eq!(esc.chars().count(), MAX_PREVIEW + 1);
        assert!(esc.ends_with('…'));
    }

    #[test]
    fn wire_preview_shows_units() {
        assert_eq!(wire_preview(&[1, 0, 0, b'\n', b'j', 0x7f]), "100\\nj\\x7F");
    }
}
