//! Model response post-processing.
//!
//! Providers routinely wrap JSON (and sometimes markdown) in a fenced code
//! block even when asked not to. Every response passes through the fence
//! unwrapper before parsing; a response that is not valid JSON after
//! unwrapping is a hard failure for that call.

use regex::Regex;
use serde::de::DeserializeOwned;

use distiller_shared::{DistillerError, Result};

/// Matches an entire response wrapped in a single fenced code block, with an
/// optional language tag.
const FENCE_PATTERN: &str = r"(?s)^```(\w*)?\s*\n?(.*?)\n?\s*```$";

/// Strip a surrounding fenced code block, if present.
pub fn unwrap_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Ok(fence) = Regex::new(FENCE_PATTERN) else {
        return trimmed;
    };
    fence
        .captures(trimmed)
        .and_then(|caps| caps.get(2))
        .map_or(trimmed, |inner| inner.as_str().trim())
}

/// Parse a JSON-mode response into `T`, unwrapping a code fence first.
pub fn parse_json_payload<T: DeserializeOwned>(text: &str) -> Result<T> {
    let payload = unwrap_code_fence(text);
    serde_json::from_str(payload).map_err(|e| {
        DistillerError::malformed(format!(
            "invalid JSON from model: {e} (got: {})",
            truncate_chars(payload, 200)
        ))
    })
}

/// Truncate `text` to at most `max` characters for error messages. Model and
/// provider output is arbitrary UTF-8, so truncation must land on a char
/// boundary.
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((at, _)) => &text[..at],
        None => text,
    }
}

/// Clean up a text-mode (markdown) response.
pub fn parse_markdown_payload(text: &str) -> String {
    unwrap_code_fence(text).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    struct Probe {
        value: u32,
    }

    #[test]
    fn unwraps_fence_with_language_tag() {
        let text = "```json\n{\"value\": 7}\n```";
        assert_eq!(unwrap_code_fence(text), "{\"value\": 7}");
    }

    #[test]
    fn unwraps_bare_fence() {
        let text = "```\n{\"value\": 7}\n```";
        assert_eq!(unwrap_code_fence(text), "{\"value\": 7}");
    }

    #[test]
    fn leaves_unfenced_text_alone() {
        assert_eq!(unwrap_code_fence("  plain text  "), "plain text");
    }

    #[test]
    fn inner_fences_are_not_stripped() {
        // Only a fence wrapping the whole response is removed.
        let text = "intro\n```json\n{}\n```\noutro";
        assert_eq!(unwrap_code_fence(text), text.trim());
    }

    #[test]
    fn parses_fenced_json() {
        let probe: Probe = parse_json_payload("```json\n{\"value\": 42}\n```").expect("parse");
        assert_eq!(probe.value, 42);
    }

    #[test]
    fn invalid_json_is_malformed_response() {
        let err = parse_json_payload::<Probe>("not json at all").unwrap_err();
        assert!(matches!(
            err,
            DistillerError::MalformedResponse { .. }
        ));
    }

    #[test]
    fn multibyte_garbage_is_truncated_without_panicking() {
        // 500 two-byte chars: byte 200 is mid-character.
        let garbage = "é".repeat(500);
        let err = parse_json_payload::<Probe>(&garbage).unwrap_err();
        assert!(matches!(err, DistillerError::MalformedResponse { .. }));

        assert_eq!(truncate_chars(&garbage, 200).chars().count(), 200);
        assert_eq!(truncate_chars("short", 200), "short");
    }

    #[test]
    fn markdown_payload_unwraps_fence() {
        let md = parse_markdown_payload("```markdown\n# Title\n\nBody.\n```");
        assert_eq!(md, "# Title\n\nBody.");
    }
}
