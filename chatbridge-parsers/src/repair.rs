use serde_json::Value;

use crate::fence::strip_code_fence;
use crate::partial::complete_partial_json;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepairError {
    #[error("no content to repair")]
    Empty,
    #[error("no JSON value found in: {0}")]
    NoJson(String),
    #[error("unrecoverable JSON: {0}")]
    Unrecoverable(String),
}

const PREVIEW_LEN: usize = 200;

fn clip(content: &str) -> String {
    if content.len() <= PREVIEW_LEN {
        return content.to_string();
    }
    let mut end = PREVIEW_LEN;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}...[truncated {} chars]",
        &content[..end],
        content.len() - end
    )
}

/// Best-effort correction of model output into a JSON document.
///
/// Fenced blocks and prose around the value are dropped, trailing commas are
/// removed and truncated structures are closed. The returned text is
/// guaranteed to parse.
pub fn repair_json(text: &str) -> Result<String, RepairError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RepairError::Empty);
    }
    if serde_json::from_str::<Value>(trimmed).is_ok() {
        return Ok(trimmed.to_string());
    }

    let body = if trimmed.starts_with(['{', '[']) {
        trimmed
    } else {
        strip_code_fence(trimmed)
    };
    if body.is_empty() {
        return Err(RepairError::Empty);
    }
    if serde_json::from_str::<Value>(body).is_ok() {
        return Ok(body.to_string());
    }

    let start = body
        .find(['{', '['])
        .ok_or_else(|| RepairError::NoJson(clip(body)))?;

    let repaired = complete_partial_json(&body[start..])
        .ok_or_else(|| RepairError::Unrecoverable(clip(body)))?;

    match serde_json::from_str::<Value>(&repaired) {
        Ok(_) => {
            tracing::debug!(
                "Repaired model output ({} -> {} chars)",
                text.len(),
                repaired.len()
            );
            Ok(repaired)
        }
        Err(e) => Err(RepairError::Unrecoverable(format!(
            "{} ({})",
            clip(&repaired),
            e
        ))),
    }
}
