//! Recovery of a single JSON object from free-form model output.
//!
//! Models wrap JSON in markdown fences, surround it with prose, or return a
//! one-element list. The routine here tries, in order: a direct parse, the
//! first balanced object or array embedded in the text, and finally unwraps
//! one-element lists (and JSON-encoded strings) down to an object.

use serde_json::{Map, Value};

use crate::error::ParseError;

/// Coerce a model response into one JSON object.
pub fn coerce_object(response: &str) -> Result<Map<String, Value>, ParseError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let body = strip_fences(trimmed);

    // The first span that parses decides; nested spans are not second chances.
    let parsed = serde_json::from_str::<Value>(body).ok().or_else(|| {
        balanced_candidates(body).find_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
    });

    parsed
        .and_then(unwrap_to_object)
        .ok_or_else(|| ParseError::NoObject(snippet(trimmed)))
}

/// Reduce a parsed value to an object: objects pass through, one-element
/// lists and JSON-encoded strings are unwrapped recursively.
pub fn unwrap_to_object(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(object) => Some(object),
        Value::Array(mut items) if items.len() == 1 => items.pop().and_then(unwrap_to_object),
        Value::String(inner) => serde_json::from_str::<Value>(inner.trim())
            .ok()
            .and_then(unwrap_to_object),
        _ => None,
    }
}

/// Content of the first fenced block, or the input when there is none.
fn strip_fences(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after = &text[open + 3..];
    // Skip the info string (`json`, `JSON`, ...) up to the end of the line.
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Every balanced `{...}` or `[...]` span, in order of its opening bracket.
fn balanced_candidates(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .filter_map(move |(start, _)| matching_close(text, start).map(|end| &text[start..=end]))
}

/// Byte index of the bracket closing the one at `start`, honouring strings.
fn matching_close(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn snippet(text: &str) -> String {
    text.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_direct_object() {
        let object = coerce_object(r#"{"vendor_name": "Acme"}"#).unwrap();
        assert_eq!(object.get("vendor_name"), Some(&json!("Acme")));
    }

    #[test]
    fn test_fenced_block() {
        let response = "Here you go:\n```json\n{\"total_amount\": \"250.00\"}\n```\nAnything else?";
        let object = coerce_object(response).unwrap();
        assert_eq!(object.get("total_amount"), Some(&json!("250.00")));
    }

    #[test]
    fn test_embedded_object_in_prose() {
        let response = r#"Sure! The data is {"note": "a } inside", "invoice_date": "05-Jan-2024"} hope that helps"#;
        let object = coerce_object(response).unwrap();
        assert_eq!(object.get("invoice_date"), Some(&json!("05-Jan-2024")));
        assert_eq!(object.get("note"), Some(&json!("a } inside")));
    }

    #[test]
    fn test_one_element_list_is_unwrapped() {
        let object = coerce_object(r#"[{"vendor_name": "Acme"}]"#).unwrap();
        assert_eq!(object.get("vendor_name"), Some(&json!("Acme")));

        let nested = coerce_object(r#"result: [[{"vendor_name": "Deep"}]]"#).unwrap();
        assert_eq!(nested.get("vendor_name"), Some(&json!("Deep")));
    }

    #[test]
    fn test_unrecoverable_responses_fail() {
        assert_eq!(coerce_object("   "), Err(ParseError::Empty));
        assert!(matches!(coerce_object("I could not read the invoice."), Err(ParseError::NoObject(_))));
        assert!(matches!(coerce_object(r#"[{"a": 1}, {"b": 2}]"#), Err(ParseError::NoObject(_))));
    }
}
