//! Log helpers that keep radio payloads readable on a single log line.
//!
//! Text received from the mesh may contain newlines, tabs or arbitrary control
//! bytes; logging it raw would split records across lines in `meshchat.log`.

use std::fmt::Write;

/// Longest preview (in chars) written for a single payload.
const MAX_PREVIEW_CHARS: usize = 300;

/// Escape control characters so `s` renders on one line, capping the output at
/// [`MAX_PREVIEW_CHARS`] characters followed by an ellipsis.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW_CHARS) + 8);
    for (idx, ch) in s.chars().enumerate() {
        if idx == MAX_PREVIEW_CHARS {
            out.push('…');
            break;
        }
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// UTF-8 safe truncation to `max_bytes` (ellipsis included), escaped for logging.
pub fn truncate_for_log(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return escape_log(input);
    }
    let mut cut = max_bytes.saturating_sub(3);
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = escape_log(&input[..cut]);
    out.push_str("...");
    out
}

/// Lower-case hex of at most `max` leading bytes, for frame traces.
pub fn hex_snippet(data: &[u8], max: usize) -> String {
    let mut out = String::with_capacity(max.min(data.len()) * 2);
    for b in data.iter().take(max) {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_newlines_and_tabs() {
        assert_eq!(escape_log("Line1\nLine2\r\tEnd"), "Line1\\nLine2\\r\\tEnd");
        assert_eq!(escape_log("bell\u{7}"), "bell\\x07");
    }

    #[test]
    fn long_payloads_are_capped() {
        let long = "x".repeat(MAX_PREVIEW_CHARS + 20);
        let esc = escape_log(&long);
        assert_eq!(esc.chars().count(), MAX_PREVIEW_CHARS + 1);
        assert!(esc.ends_with('…'));
    }

    #[test]
    fn truncate_does_not_split_multibyte_chars() {
        // "€" is 3 bytes; max 10 leaves a cut target of 7, inside the euro sign.
        assert_eq!(truncate_for_log("12345€7890", 10), "12345...");
        assert_eq!(truncate_for_log("hello", 10), "hello");
    }

    #[test]
    fn hex_snippet_limits_length() {
        assert_eq!(hex_snippet(&[0x94, 0xc3, 0x00, 0x10], 2), "94c3");
        assert_eq!(hex_snippet(&[], 8), "");
    }
}
