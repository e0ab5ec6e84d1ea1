use std::collections::BTreeMap;

use chatbridge_types::{LlmError, ToolCall};
use serde_json::{Map, Value};

use crate::partial::parse_partial_json;
use crate::repair::repair_json;

/// Highest slot count accepted from a single response.
pub const MAX_TOOL_CALL_SLOTS: u32 = 128;

/// One streamed fragment of a tool call, already lifted out of the provider chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallSlot {
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

impl ToolCallSlot {
    /// Tolerant view of the arguments received so far; `{}` until something parses.
    pub fn input(&self) -> Value {
        parse_partial_json(&self.arguments).unwrap_or_else(|| Value::Object(Map::new()))
    }

    fn is_empty(&self) -> bool {
        self.name.is_none() && self.arguments.is_empty()
    }

    fn final_input(&self) -> Value {
        if self.arguments.trim().is_empty() {
            return Value::Object(Map::new());
        }
        if let Ok(value) = serde_json::from_str(&self.arguments) {
            return value;
        }
        match repair_json(&self.arguments)
            .ok()
            .and_then(|repaired| serde_json::from_str(&repaired).ok())
        {
            Some(value) => value,
            None => {
                tracing::warn!(
                    target: "llm.tool_call",
                    "Arguments for {:?} are not JSON; passing them through as a string",
                    self.name
                );
                Value::String(self.arguments.clone())
            }
        }
    }
}

/// Per-request accumulation of streamed tool calls, keyed by slot index.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    slots: BTreeMap<u32, ToolCallSlot>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a delta into its slot. The first id and name seen for a slot
    /// stick; argument fragments are appended in arrival order.
    pub fn apply(&mut self, delta: ToolCallDelta) -> Result<&ToolCallSlot, LlmError> {
        if delta.index >= MAX_TOOL_CALL_SLOTS {
            return Err(LlmError::InvalidToolCallSlot(delta.index));
        }

        let slot = self.slots.entry(delta.index).or_default();
        if slot.id.is_none() {
            slot.id = delta.id.filter(|id| !id.is_empty());
        }
        if slot.name.is_none() {
            slot.name = delta.name.filter(|name| !name.is_empty());
        }
        if let Some(arguments) = delta.arguments {
            slot.arguments.push_str(&arguments);
        }
        Ok(slot)
    }

    pub fn get(&self, index: u32) -> Option<&ToolCallSlot> {
        self.slots.get(&index)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn reset(&mut self) {
        self.slots.clear();
    }

    /// Drain the accumulated calls in slot order.
    pub fn finish(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.slots)
            .into_values()
            .filter(|slot| !slot.is_empty())
            .map(|slot| {
                let input = slot.final_input();
                let tool_call_id = match slot.id {
                    Some(id) => id,
                    None => {
                        tracing::warn!(target: "llm.tool_call", "tool_call_id empty; generating fallback uuid");
                        uuid::Uuid::new_v4().to_string()
                    }
                };
                ToolCall {
                    tool_call_id,
                    tool_name: slot.name.unwrap_or_default(),
                    input,
                }
            })
            .collect()
    }
}
