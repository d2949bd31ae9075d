//! Balanced-delimiter extraction.
//!
//! Payload bodies are located by depth counting rather than pattern matching so
//! that every scan is a single linear pass that terminates on any input. All
//! delimiters are ASCII, which keeps every returned slice on char boundaries.

/// Returns the balanced JSON object starting at `start`.
///
/// `text[start]` must be `{`. Braces inside string literals are ignored and a
/// backslash inside a string escapes exactly one byte. Returns `None` when the
/// object never closes, which is the usual shape of output a TUI is still
/// writing.
pub fn extract_balanced_json(text: &str, start: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Finds the `]` that closes a key-value marker whose value starts at `from`.
///
/// Depth starts at 1 for the marker's own `[`, so values may contain balanced
/// `[...]` pairs. Returns the index of the closing bracket.
pub fn find_closing_bracket(text: &str, from: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (offset, &b) in text.as_bytes().get(from..)?.iter().enumerate() {
        match b {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(from + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Index of the first non-ASCII-whitespace byte at or after `from`.
pub(crate) fn skip_whitespace(text: &str, from: usize) -> usize {
    let bytes = text.as_bytes();
    let mut i = from;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}
