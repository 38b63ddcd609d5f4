//! Best-effort cleanup of free-form model output before JSON parsing.
//!
//! The repair set is deliberately small and enumerable: doubled-quote key
//! artifacts and trailing commas. Everything else is the parser's verdict.

use crate::error::{DispatchError, Result, bounded_snippet};
use serde_json::Value;

const REASONING_TAGS: [&str; 3] = ["think", "thinking", "reasoning"];
const FENCE: &str = "```";

/// Trim, drop reasoning-tag blocks, and unwrap a fenced code block if one is
/// present (else strip stray fence markers).
pub fn clean(text: &str) -> String {
    let mut cleaned = text.trim().to_string();
    for tag in REASONING_TAGS {
        cleaned = strip_tag_pair(&cleaned, tag);
    }

    if let Some(inner) = fenced_block(&cleaned) {
        return inner.trim().to_string();
    }

    cleaned
        .replace("```json", "")
        .replace(FENCE, "")
        .trim()
        .to_string()
}

/// Extract and parse the first-`{` .. last-`}` slice of the cleaned text,
/// applying the repair heuristics before parsing.
pub fn extract_json(text: &str) -> Result<Value> {
    extract_delimited(text, '{', '}')
}

/// Same as [`extract_json`] but keyed on `[` / `]`.
pub fn extract_json_array(text: &str) -> Result<Value> {
    extract_delimited(text, '[', ']')
}

fn extract_delimited(text: &str, open: char, close: char) -> Result<Value> {
    let cleaned = clean(text);

    let (start, end) = match (cleaned.find(open), cleaned.rfind(close)) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            return Err(DispatchError::NoJsonFound {
                snippet: bounded_snippet(&cleaned),
            });
        }
    };

    let candidate = &cleaned[start..=end];
    let repaired = strip_trailing_commas(&collapse_doubled_quotes(candidate));

    serde_json::from_str(&repaired).map_err(|err| DispatchError::InvalidJson {
        snippet: bounded_snippet(&repaired),
        message: err.to_string(),
    })
}

/// Remove every `<tag>...</tag>` block (case-insensitive, non-greedy, spans
/// lines). An unmatched opening tag keeps the rest of the text intact.
fn strip_tag_pair(text: &str, tag: &str) -> String {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    // Tags are ASCII, so lowercasing preserves byte offsets.
    let lower = text.to_ascii_lowercase();

    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while let Some(rel) = lower[pos..].find(&open) {
        let open_at = pos + rel;
        out.push_str(&text[pos..open_at]);

        let content_start = open_at + open.len();
        match lower[content_start..].find(&close) {
            Some(close_rel) => {
                pos = content_start + close_rel + close.len();
            }
            None => {
                out.push_str(&text[open_at..]);
                return out;
            }
        }
    }
    out.push_str(&text[pos..]);
    out
}

/// Contents of the first fenced code block, label line excluded. Returns
/// `None` when no complete open/close fence pair exists.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find(FENCE)?;
    let after_fence = &text[open + FENCE.len()..];
    // The rest of the fence line is a label ("json", "JSON", or nothing).
    let body_start = after_fence.find('\n').map_or(after_fence.len(), |i| i + 1);
    let body = &after_fence[body_start..];
    let close = body.find(FENCE)?;
    Some(&body[..close])
}

/// Collapse the `""key"":` artifact some models emit into `"key":`.
fn collapse_doubled_quotes(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'"' && i + 1 < bytes.len() && bytes[i + 1] == b'"' {
            let key_start = i + 2;
            let mut key_end = key_start;
            while key_end < bytes.len() && is_key_byte(bytes[key_end]) {
                key_end += 1;
            }

            let has_closing_pair = key_end > key_start
                && key_end + 1 < bytes.len()
                && bytes[key_end] == b'"'
                && bytes[key_end + 1] == b'"';
            if has_closing_pair {
                let mut after = key_end + 2;
                while after < bytes.len() && bytes[after].is_ascii_whitespace() {
                    after += 1;
                }
                if after < bytes.len() && bytes[after] == b':' {
                    out.push(b'"');
                    out.extend_from_slice(&bytes[key_start..key_end]);
                    out.push(b'"');
                    i = key_end + 2;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    // Only whole input bytes were copied, so validity is preserved.
    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}

fn is_key_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-'
}

/// Drop commas whose next non-whitespace byte closes an object or array.
/// String literals are left untouched.
fn strip_trailing_commas(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &byte) in bytes.iter().enumerate() {
        if in_string {
            out.push(byte);
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => {
                in_string = true;
                out.push(byte);
            }
            b',' => {
                let mut next = i + 1;
                while next < bytes.len() && bytes[next].is_ascii_whitespace() {
                    next += 1;
                }
                if next >= bytes.len() || (bytes[next] != b'}' && bytes[next] != b']') {
                    out.push(byte);
                }
            }
            _ => out.push(byte),
        }
    }

    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}
