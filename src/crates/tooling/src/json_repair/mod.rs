//! Lenient extraction of a JSON object from untrusted LLM output.
//!
//! Chat models wrapped in JSON mode still occasionally wrap their answer in
//! a code fence or add leading/trailing prose. Rather than failing the
//! whole pipeline on a strict parse, callers that can tolerate a best-effort
//! result should extract the first balanced `{...}` span and parse that.
//!
//! # Example
//!
//! ```rust
//! use tooling::json_repair::extract_json_object;
//!
//! let raw = "Sure, here you go:\n```json\n{\"a\": 1}\n```\nHope that helps!";
//! let value = extract_json_object(raw).unwrap();
//! assert_eq!(value["a"], 1);
//! ```

use crate::{Result, ToolingError};
use serde_json::Value;

/// Strip a leading/trailing Markdown code fence (```` ```json `````` /
/// ```` ``` ````) if present, otherwise return the input unchanged.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let without_prefix = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_prefix.strip_suffix("```").unwrap_or(without_prefix).trim()
}

/// Find the first balanced `{...}` span in `text`, accounting for nested
/// braces and braces inside string literals.
pub fn find_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes.iter().enumerate().skip(start) {
        if in_string {
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
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=offset]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract and parse the first balanced JSON object found in `text`,
/// tolerating a surrounding code fence or prose.
pub fn extract_json_object(text: &str) -> Result<Value> {
    let stripped = strip_code_fence(text);
    let candidate = find_balanced_object(stripped)
        .ok_or_else(|| ToolingError::General("no balanced JSON object found in text".to_string()))?;

    serde_json::from_str(candidate).map_err(ToolingError::Serialization)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence_json_tag() {
        let input = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(input), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fence_no_fence() {
        let input = "{\"a\": 1}";
        assert_eq!(strip_code_fence(input), "{\"a\": 1}");
    }

    #[test]
    fn test_find_balanced_object_ignores_braces_in_strings() {
        let input = r#"prefix {"a": "}", "b": 2} suffix"#;
        let found = find_balanced_object(input).unwrap();
        assert_eq!(found, r#"{"a": "}", "b": 2}"#);
    }

    #[test]
    fn test_extract_json_object_with_surrounding_prose() {
        let raw = "Here is the result:\n```json\n{\"target_prompt_file\": \"flowchart.md\"}\n```\nLet me know if helpful.";
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value["target_prompt_file"], "flowchart.md");
    }

    #[test]
    fn test_extract_json_object_no_object_errors() {
        let raw = "no json here at all";
        assert!(extract_json_object(raw).is_err());
    }

    #[test]
    fn test_extract_json_object_nested() {
        let raw = r#"{"outer": {"inner": 1}, "list": [1, 2, 3]}"#;
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value["outer"]["inner"], 1);
    }
}
