//! Pulling a JSON object out of a model reply.
//!
//! Models asked for "only the JSON object" still wrap it in code fences or a
//! sentence of preamble often enough that a strict parse is not usable.

use serde_json::Value;

use folio_types::{FolioError, Result};

/// Parse the JSON object in `reply`. Tries, in order: the whole reply, the
/// body of a fenced code block, and the span from the first `{` to the last
/// `}`.
pub fn extract_object(reply: &str, what: &str) -> Result<Value> {
    let trimmed = reply.trim();
    let candidates = [
        Some(trimmed),
        fenced_body(trimmed),
        brace_span(trimmed),
    ];

    let mut last_error = None;
    for candidate in candidates.into_iter().flatten() {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) if value.is_object() => return Ok(value),
            Ok(_) => last_error = Some("expected a JSON object".to_string()),
            Err(e) => last_error = Some(e.to_string()),
        }
    }
    Err(FolioError::parse(
        what,
        last_error.unwrap_or_else(|| "empty reply".into()),
    ))
}

fn fenced_body(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // Skip an info string such as `json`.
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
