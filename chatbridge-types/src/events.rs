use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{FinishReason, ObjectResponse, ToolCall, Usage};

/// Events yielded by a streamed text generation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ChatStreamEvent {
    TextDelta {
        delta: String,
    },
    /// A tool-call slot changed. `arguments` is everything received so far for
    /// the slot and `input` its tolerant parse.
    FunctionCall {
        index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
        input: Value,
    },
    Done {
        finish_reason: FinishReason,
        tool_calls: Vec<ToolCall>,
        usage: Option<Usage>,
    },
}

/// Events yielded by a streamed object generation.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectStreamEvent<T> {
    /// Best-effort reconstruction of the object received so far.
    Partial(Value),
    Final(ObjectResponse<T>),
}
