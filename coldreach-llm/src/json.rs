/// Strict JSON extraction from model output
///
/// Models asked for JSON still wrap it in prose or code fences now and then.
/// [`ensure_strict_json`] returns text that parses, trying in order: the whole
/// (trimmed) text, each fenced code block, then each substring running from a
/// `{` to the point where its braces balance.

use std::sync::OnceLock;

use regex::Regex;

use crate::providers::{LlmError, LlmResult};

fn parses(candidate: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(candidate).is_ok()
}

fn fenced_block(text: &str) -> Option<String> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();

    let fence = FENCE
        .get_or_init(|| Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").ok())
        .as_ref()?;

    fence
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str().trim())
        .find(|candidate| parses(candidate))
        .map(str::to_string)
}

fn balanced_object(text: &str) -> Option<String> {
    text.match_indices('{')
        .find_map(|(start, _)| balanced_from(&text[start..]))
}

/// The prefix of `text` (which starts with `{`) up to where its braces balance,
/// if that prefix parses
fn balanced_from(text: &str) -> Option<String> {
    let mut depth = 0usize;

    for (offset, ch) in text.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let candidate = &text[..=offset];
                    return parses(candidate).then(|| candidate.to_string());
                }
            }
            _ => {}
        }
    }

    None
}

/// Returns text that parses as JSON
///
/// # Errors
///
/// `ResponseMalformed` when the text is empty or nothing in it parses.
pub fn ensure_strict_json(text: &str) -> LlmResult<String> {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return Err(LlmError::ResponseMalformed("empty response".to_string()));
    }

    if parses(cleaned) {
        return Ok(cleaned.to_string());
    }

    fenced_block(cleaned)
        .or_else(|| balanced_object(cleaned))
        .ok_or_else(|| LlmError::ResponseMalformed("response contains no valid JSON".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_json_passes_through() {
        assert_eq!(ensure_strict_json("  {\"ok\": true}\n").unwrap(), "{\"ok\": true}");
        assert_eq!(ensure_strict_json("[1, 2]").unwrap(), "[1, 2]");
    }

    #[test]
    fn test_fenced_block() {
        let text = "Here you go:\n```json\n{\"ok\": true}\n```\nAnything else?";
        assert_eq!(ensure_strict_json(text).unwrap(), "{\"ok\": true}");

        let text = "```\n{\"plain\": 1}\n```";
        assert_eq!(ensure_strict_json(text).unwrap(), "{\"plain\": 1}");
    }

    #[test]
    fn test_first_parsing_fence_wins() {
        let text = "```json\n{broken\n```\nthen\n```json\n{\"second\": 2}\n```";
        assert_eq!(ensure_strict_json(text).unwrap(), "{\"second\": 2}");
    }

    #[test]
    fn test_balanced_braces_in_prose() {
        let text = "Sure! {\"name\": \"Ada\", \"skills\": {\"math\": 10}} Hope that helps.";
        assert_eq!(
            ensure_strict_json(text).unwrap(),
            "{\"name\": \"Ada\", \"skills\": {\"math\": 10}}"
        );
    }

    #[test]
    fn test_balanced_scan_continues_past_invalid_prefix() {
        let text = "{not json} and then {\"a\": 1}";
        assert_eq!(ensure_strict_json(text).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(ensure_strict_json(""), Err(LlmError::ResponseMalformed(_))));
        assert!(matches!(ensure_strict_json("   \n"), Err(LlmError::ResponseMalformed(_))));
        assert!(matches!(
            ensure_strict_json("no json here"),
            Err(LlmError::ResponseMalformed(_))
        ));
        assert!(matches!(
            ensure_strict_json("{\"unterminated\": "),
            Err(LlmError::ResponseMalformed(_))
        ));
    }
}
