//! Tolerant parsing of JSON that may be cut off anywhere.
//!
//! The completer walks the text once, keeping a stack of open containers.
//! When the input ends it drops whatever cannot be finished (a half-written
//! key, a dangling `,` or `:`), closes an open value string, finishes literal
//! prefixes and then closes every open container. Input that is malformed
//! rather than merely truncated is rejected.

use serde_json::Value;

use crate::fence::strip_code_fence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Key,
    Colon,
    Value,
    CommaOrClose,
}

#[derive(Debug)]
struct Frame {
    container: Container,
    expect: Expect,
    /// Output length right after the last complete member (or the opening bracket).
    rollback: usize,
    /// Output length before the last `,` while no member has followed it yet.
    pending_comma: Option<usize>,
}

impl Frame {
    fn open(container: Container, rollback: usize) -> Self {
        Self {
            container,
            expect: match container {
                Container::Object => Expect::Key,
                Container::Array => Expect::Value,
            },
            rollback,
            pending_comma: None,
        }
    }

    fn value_done(&mut self, out_len: usize) {
        self.expect = Expect::CommaOrClose;
        self.rollback = out_len;
        self.pending_comma = None;
    }

    fn closing(&self) -> char {
        match self.container {
            Container::Object => '}',
            Container::Array => ']',
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Token {
    None,
    Str { is_key: bool, escape: bool },
    Number { start: usize },
    Literal { start: usize },
}

const LITERALS: [&str; 3] = ["true", "false", "null"];

/// Close a JSON document that may have been truncated.
///
/// `text` must start (after whitespace) with `{` or `[`. Anything after the
/// root value closes is ignored. Raw control characters inside strings are
/// escaped and trailing commas are dropped on the way.
pub fn complete_partial_json(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len() + 8);
    let mut stack: Vec<Frame> = Vec::new();
    let mut token = Token::None;
    let mut started = false;

    for c in text.chars() {
        // tokens that end on a structural character fall through below
        match token {
            Token::Str { is_key, escape } => {
                let frame = stack.last_mut()?;
                if escape {
                    out.push(c);
                    token = Token::Str {
                        is_key,
                        escape: false,
                    };
                } else if c == '\\' {
                    out.push(c);
                    token = Token::Str {
                        is_key,
                        escape: true,
                    };
                } else if c == '"' {
                    out.push(c);
                    token = Token::None;
                    if is_key {
                        frame.expect = Expect::Colon;
                    } else {
                        frame.value_done(out.len());
                    }
                } else {
                    push_string_char(&mut out, c);
                }
                continue;
            }
            Token::Number { .. } => {
                if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-') {
                    out.push(c);
                    continue;
                }
                token = Token::None;
                let end = out.len();
                stack.last_mut()?.value_done(end);
            }
            Token::Literal { start } => {
                if c.is_ascii_alphabetic() {
                    out.push(c);
                    continue;
                }
                if !LITERALS.contains(&&out[start..]) {
                    return None;
                }
                token = Token::None;
                let end = out.len();
                stack.last_mut()?.value_done(end);
            }
            Token::None => {}
        }

        if c.is_whitespace() {
            if started {
                out.push(c);
            }
            continue;
        }

        let Some(frame) = stack.last_mut() else {
            if started {
                // root already closed; the rest is trailing prose
                break;
            }
            let container = match c {
                '{' => Container::Object,
                '[' => Container::Array,
                _ => return None,
            };
            started = true;
            out.push(c);
            stack.push(Frame::open(container, out.len()));
            continue;
        };

        match c {
            '}' | ']' => {
                if c != frame.closing() {
                    return None;
                }
                match frame.expect {
                    Expect::CommaOrClose => {}
                    Expect::Key | Expect::Value => {
                        if let Some(comma) = frame.pending_comma {
                            out.truncate(comma);
                        } else if frame.container == Container::Object
                            && frame.expect == Expect::Value
                        {
                            return None;
                        }
                    }
                    Expect::Colon => return None,
                }
                out.push(c);
                stack.pop();
                match stack.last_mut() {
                    Some(parent) => parent.value_done(out.len()),
                    None => break,
                }
            }
            ',' => {
                if frame.expect != Expect::CommaOrClose {
                    return None;
                }
                frame.pending_comma = Some(out.len());
                out.push(c);
                frame.expect = match frame.container {
                    Container::Object => Expect::Key,
                    Container::Array => Expect::Value,
                };
            }
            ':' => {
                if frame.expect != Expect::Colon {
                    return None;
                }
                out.push(c);
                frame.expect = Expect::Value;
            }
            '"' => {
                let is_key = match (frame.container, frame.expect) {
                    (Container::Object, Expect::Key) => true,
                    (_, Expect::Value) => false,
                    _ => return None,
                };
                out.push(c);
                token = Token::Str {
                    is_key,
                    escape: false,
                };
            }
            '{' | '[' => {
                if frame.expect != Expect::Value {
                    return None;
                }
                out.push(c);
                let container = if c == '{' {
                    Container::Object
                } else {
                    Container::Array
                };
                stack.push(Frame::open(container, out.len()));
            }
            '-' | '0'..='9' => {
                if frame.expect != Expect::Value {
                    return None;
                }
                token = Token::Number { start: out.len() };
                out.push(c);
            }
            't' | 'f' | 'n' => {
                if frame.expect != Expect::Value {
                    return None;
                }
                token = Token::Literal { start: out.len() };
                out.push(c);
            }
            _ => return None,
        }
    }

    if !started {
        return None;
    }
    if stack.is_empty() {
        return Some(out);
    }

    finish_token(&mut out, &mut stack, token)?;

    let frame = stack.last()?;
    match (frame.container, frame.expect) {
        (_, Expect::CommaOrClose) => {}
        (Container::Object, Expect::Colon) | (Container::Object, Expect::Value) => {
            out.truncate(frame.rollback);
        }
        (_, Expect::Key) | (Container::Array, Expect::Value) => {
            if let Some(comma) = frame.pending_comma {
                out.truncate(comma);
            }
        }
        (Container::Array, Expect::Colon) => return None,
    }

    while let Some(frame) = stack.pop() {
        out.push(frame.closing());
    }
    Some(out)
}

fn push_string_char(out: &mut String, c: char) {
    match c {
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
        c => out.push(c),
    }
}

fn finish_token(out: &mut String, stack: &mut [Frame], token: Token) -> Option<()> {
    let frame = stack.last_mut()?;
    match token {
        Token::None => {}
        Token::Str { is_key: true, .. } => {
            out.truncate(frame.rollback);
            frame.pending_comma = None;
            frame.expect = Expect::CommaOrClose;
        }
        Token::Str {
            is_key: false,
            escape,
        } => {
            if escape {
                out.pop();
            }
            drop_partial_unicode_escape(out);
            out.push('"');
            frame.value_done(out.len());
        }
        Token::Number { start } => {
            let kept = out[start..]
                .trim_end_matches(['.', 'e', 'E', '+', '-'])
                .len();
            out.truncate(start + kept);
            // a lone sign leaves the frame still expecting a value
            if kept > 0 {
                frame.value_done(out.len());
            }
        }
        Token::Literal { start } => {
            let prefix = &out[start..];
            let literal = LITERALS.iter().find(|lit| lit.starts_with(prefix))?;
            let rest = &literal[prefix.len()..];
            out.push_str(rest);
            frame.value_done(out.len());
        }
    }
    Some(())
}

/// Remove a `\u` escape that lost some of its hex digits.
///
/// The backslash only starts an escape when it is not itself escaped, so an
/// even run of backslashes before the `u` leaves the text alone.
fn drop_partial_unicode_escape(out: &mut String) {
    let bytes = out.as_bytes();
    let len = bytes.len();
    for digits in 0..4 {
        if len < digits + 2 {
            break;
        }
        let at = len - digits - 2;
        if bytes[at] == b'\\'
            && bytes[at + 1] == b'u'
            && bytes[at + 2..].iter().all(|b| b.is_ascii_hexdigit())
        {
            let run = bytes[..=at]
                .iter()
                .rev()
                .take_while(|b| **b == b'\\')
                .count();
            if run % 2 == 1 {
                out.truncate(at);
            }
            return;
        }
    }
}

/// Best-effort parse of a JSON buffer that is still growing.
///
/// Returns `None` when nothing usable can be reconstructed yet.
pub fn parse_partial_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    let body = if trimmed.starts_with(['{', '[']) {
        trimmed
    } else {
        strip_code_fence(trimmed)
    };
    if body.is_empty() {
        return None;
    }

    let Some(start) = body.find(['{', '[']) else {
        return serde_json::from_str(body).ok();
    };

    let completed = complete_partial_json(&body[start..])?;
    serde_json::from_str(&completed).ok()
}
