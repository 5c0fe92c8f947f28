//! Diagnostic JSON-candidate extraction from free text
//!
//! Used only to explain parse failures and to probe free-text output. The
//! classification path never treats a recovered candidate as a result.

use regex::Regex;
use std::sync::LazyLock;

static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*\n?(.*?)```").unwrap());

static ANY_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*\n?(.*?)```").unwrap());

/// Find the most likely JSON fragment in `text`.
///
/// Order: a ```json fence, then any fenced block, then the first balanced
/// `{...}` or `[...]` region.
pub fn extract_json_candidate(text: &str) -> Option<String> {
    if let Some(body) = JSON_FENCE.captures(text).and_then(|c| c.get(1)) {
        let body = body.as_str().trim();
        if !body.is_empty() {
            return Some(body.to_string());
        }
    }

    if let Some(body) = ANY_FENCE.captures(text).and_then(|c| c.get(1)) {
        let body = body.as_str().trim();
        if body.starts_with('{') || body.starts_with('[') {
            return Some(body.to_string());
        }
    }

    balanced_region(text).map(str::to_string)
}

/// First balanced object or array, honouring string literals and escapes.
fn balanced_region(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;

    let mut openers: Vec<char> = Vec::new();
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
            '{' | '[' => openers.push(ch),
            '}' | ']' => {
                let expected = if ch == '}' { '{' } else { '[' };
                if openers.pop() != Some(expected) {
                    return None;
                }
                if openers.is_empty() {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}
