//! Pulling structured data out of free-form model text.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::RootKind;

lazy_static! {
    static ref JSON_FENCE: Regex =
        Regex::new(r"```json[ \t]*\r?\n([\s\S]*?)\r?\n?```").expect("valid fence regex");
}

/// Candidate after extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub value: Value,

    /// Set when the text looked like it should hold JSON but did not parse.
    /// `value` is then the raw text.
    pub parse_error: Option<String>,
}

/// Turn a candidate into the value handed to the contract.
///
/// Only strings are touched, and only when the contract expects an object
/// or array root. Everything else passes through unchanged.
pub fn extract(candidate: Value, root: RootKind) -> Extracted {
    let text = match candidate {
        Value::String(text) if root.is_structured() => text,
        other => {
            return Extracted {
                value: other,
                parse_error: None,
            }
        }
    };

    match extract_text(&text, root) {
        Ok(value) => Extracted {
            value,
            parse_error: None,
        },
        Err(parse_error) => Extracted {
            value: Value::String(text),
            parse_error: Some(parse_error),
        },
    }
}

/// Parse JSON out of text: a fenced ```json block first, then each
/// top-level balanced span for the root kind in order, then the whole
/// trimmed text.
///
/// On failure the error from the first span tried is reported, since it is
/// the most likely intended payload.
pub fn extract_text(text: &str, root: RootKind) -> Result<Value, String> {
    if let Some(fenced) = JSON_FENCE.captures(text).and_then(|c| c.get(1)) {
        return parse(fenced.as_str());
    }

    let (open, close) = match root {
        RootKind::Array => ('[', ']'),
        _ => ('{', '}'),
    };

    let mut first_error = None;
    let mut from = 0;
    while let Some((start, end)) = balanced_span(text, from, open, close) {
        match parse(&text[start..end]) {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
        from = end;
    }

    parse(text.trim()).map_err(|e| first_error.unwrap_or(e))
}

fn parse(text: &str) -> Result<Value, String> {
    serde_json::from_str(text.trim()).map_err(|e| format!("Failed to parse JSON: {}", e))
}

/// Byte range of the first top-level `open ... close` span at or after
/// `from`, skipping delimiters inside string literals.
fn balanced_span(text: &str, from: usize, open: char, close: char) -> Option<(usize, usize)> {
    let start = from + text[from..].find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some((start, start + offset + ch.len_utf8()));
                }
            }
            _ => {}
        }
    }

    None
}
