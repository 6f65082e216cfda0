//! Tolerant extraction of a JSON object from model output.

use serde_json::Value;

/// Strip code fences, try a direct parse, then fall back to the first
/// balanced `{ ... }` span in the text that parses as a JSON object.
pub fn extract_json_payload(raw: &str) -> Option<Value> {
    let cleaned = strip_fences(raw);

    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        if value.is_object() {
            return Some(value);
        }
    }

    raw.char_indices()
        .filter(|(_, c)| *c == '{')
        .filter_map(|(start, _)| balanced_object_end(raw, start).map(|end| &raw[start..=end]))
        .find_map(|candidate| {
            serde_json::from_str::<Value>(candidate)
                .ok()
                .filter(Value::is_object)
        })
}

fn strip_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```JSON")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Byte index of the `}` closing the object that opens at `start`.
/// Braces inside string literals are ignored.
fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
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
            '{' => depth += 1,
            '}' => {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_fenced() {
        assert!(extract_json_payload(r#"{"a": 1}"#).is_some());
        assert!(extract_json_payload("```json\n{\"a\": 1}\n```").is_some());
        assert!(extract_json_payload("```\n{\"a\": 1}\n```").is_some());
    }

    #[test]
    fn test_braces_inside_strings() {
        let raw = r#"Result: {"note": "looks like a } brace", "b": 2} trailing"#;
        let value = extract_json_payload(raw).unwrap();
        assert_eq!(value["b"], 2);
    }

    #[test]
    fn test_skips_non_json_braces() {
        let raw = "see {this} then {\"karat\": 18}";
        let value = extract_json_payload(raw).unwrap();
        assert_eq!(value["karat"], 18);
    }

    #[test]
    fn test_no_object() {
        assert!(extract_json_payload("[1, 2, 3]").is_none());
        assert!(extract_json_payload("no json here").is_none());
        assert!(extract_json_payload("{ unclosed").is_none());
    }
}
