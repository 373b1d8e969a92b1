//! Cleaning of requester-supplied text before it is placed in a message body.

pub const MAX_FIELD_CHARS: usize = 200;
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Collapses a field onto one line: control characters (CR and LF included)
/// become spaces, runs of whitespace collapse, and the result is capped.
pub fn single_line(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_FIELD_CHARS)
        .collect()
}

/// Keeps line breaks in free text but drops every other control character.
pub fn multi_line(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(|c| *c == '\n' || *c == '\t' || !c.is_control())
        .take(MAX_MESSAGE_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}
