use once_cell::sync::Lazy;
use regex::Regex;

// a fence alone on its line; JSON strings cannot hold a raw newline
static CLOSING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[^\S\n]*```[^\S\n]*(?:\n|$)").expect("valid fence regex"));

const FENCE: &str = "```";

/// Return the body of the first fenced code block in `text`.
///
/// The closing fence has to sit on its own line, so backticks inside a JSON
/// string never end the block. Single-line blocks (```` ```{..}``` ````) lose
/// their trailing fence only. An opening fence without its closing fence (a
/// stream still in flight) yields everything after the opening line. A lone
/// closing fence after the payload is dropped. Text without fences is
/// returned trimmed.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();

    let Some(pos) = trimmed.find(FENCE) else {
        return trimmed;
    };

    let before = &trimmed[..pos];
    if before.contains(['{', '[']) {
        // closing fence with the opening one outside the buffer
        return before.trim();
    }

    let after = &trimmed[pos + FENCE.len()..];
    let tag_end = after
        .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '+' | '-')))
        .unwrap_or(after.len());
    let rest = &after[tag_end..];
    if rest.trim().is_empty() {
        // still receiving the language tag
        return "";
    }

    match closing_fence(rest) {
        Some(close) => rest[..close].trim(),
        None => {
            let body = rest.trim();
            body.strip_suffix(FENCE).unwrap_or(body).trim()
        }
    }
}

/// Offset of the first fence in `body` that occupies a line of its own.
fn closing_fence(body: &str) -> Option<usize> {
    CLOSING_FENCE.find(body).map(|m| m.start())
}
