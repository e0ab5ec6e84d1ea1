use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Function tools must take an object; anything else is wrapped under `input`.
    pub fn normalized_parameters(&self) -> Value {
        let parameters = self.parameters.clone();
        if parameters.is_null() || is_object_schema(&parameters) {
            return parameters;
        }

        let mut properties = Map::new();
        properties.insert("input".to_string(), parameters);

        let mut schema = Map::new();
        schema.insert("type".to_string(), Value::String("object".to_string()));
        schema.insert("properties".to_string(), Value::Object(properties));
        schema.insert(
            "required".to_string(),
            Value::Array(vec![Value::String("input".to_string())]),
        );

        Value::Object(schema)
    }
}

fn is_object_schema(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            if map
                .get("type")
                .and_then(|t| t.as_str())
                .map(|t| t.eq_ignore_ascii_case("object"))
                .unwrap_or(false)
            {
                return true;
            }

            map.contains_key("properties")
        }
        _ => false,
    }
}

impl From<ToolDefinition> for async_openai::types::chat::ChatCompletionTools {
    fn from(definition: ToolDefinition) -> Self {
        let parameters = definition.normalized_parameters();
        async_openai::types::chat::ChatCompletionTools::Function(
            async_openai::types::chat::ChatCompletionTool {
                function: async_openai::types::chat::FunctionObject {
                    name: definition.name,
                    description: Some(definition.description),
                    parameters: if parameters.is_null() {
                        None
                    } else {
                        Some(parameters)
                    },
                    strict: None,
                },
            },
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    Assistant,
    User,
    Tool,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema, PartialEq)]
#[serde(rename_all = "snake_case", tag = "part_type", content = "data")]
pub enum Part {
    Text(String),
    ToolCall(ToolCall),
    ToolResult(ToolResponse),
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema, PartialEq)]
pub struct Message {
    pub id: String,
    pub name: Option<String>,
    pub role: MessageRole,
    pub parts: Vec<Part>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: MessageRole::User,
            name: None,
            parts: vec![],
        }
    }
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            parts: vec![Part::Text(text.into())],
            ..Default::default()
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            parts: vec![Part::Text(text.into())],
            ..Default::default()
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            parts: vec![Part::Text(text.into())],
            ..Default::default()
        }
    }

    /// Assistant turn that requested tools. Empty text is not emitted as a part.
    pub fn assistant_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let text = text.into();
        let mut parts = Vec::with_capacity(tool_calls.len() + 1);
        if !text.is_empty() {
            parts.push(Part::Text(text));
        }
        parts.extend(tool_calls.into_iter().map(Part::ToolCall));
        Self {
            role: MessageRole::Assistant,
            parts,
            ..Default::default()
        }
    }

    pub fn tool_response(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        result: Value,
    ) -> Self {
        Self {
            role: MessageRole::Tool,
            parts: vec![Part::ToolResult(ToolResponse {
                tool_call_id: tool_call_id.into(),
                tool_name: tool_name.into(),
                result,
            })],
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn as_text(&self) -> Option<String> {
        let parts = self
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>();
        if !parts.is_empty() {
            Some(parts.join("\n\n"))
        } else {
            None
        }
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolCall(tool_call) => Some(tool_call.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_responses(&self) -> Vec<ToolResponse> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolResult(response) => Some(response.clone()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema, PartialEq)]
pub struct ToolResponse {
    pub tool_call_id: String,
    pub tool_name: String,
    pub result: Value,
}

impl ToolResponse {
    /// Tool messages carry plain text; strings go through unquoted.
    pub fn result_text(&self) -> String {
        match &self.result {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    FunctionCall,
}

impl From<async_openai::types::chat::FinishReason> for FinishReason {
    fn from(reason: async_openai::types::chat::FinishReason) -> Self {
        use async_openai::types::chat::FinishReason as Provider;
        match reason {
            Provider::Stop => FinishReason::Stop,
            Provider::Length => FinishReason::Length,
            Provider::ToolCalls => FinishReason::ToolCalls,
            Provider::ContentFilter => FinishReason::ContentFilter,
            Provider::FunctionCall => FinishReason::FunctionCall,
        }
    }
}

/// Result of a one-shot text generation.
#[derive(Debug, Clone, PartialEq)]
pub struct TextResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Option<Usage>,
}

impl TextResponse {
    pub fn into_message(self) -> Message {
        Message::assistant_with_tool_calls(self.content, self.tool_calls)
    }
}

/// Which path produced a structured object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// Schema-constrained decoding on the provider side.
    Strict,
    /// Unconstrained generation followed by local repair and validation.
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectResponse<T> {
    pub object: T,
    pub raw: String,
    pub usage: Option<Usage>,
    pub mode: GenerationMode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_object_parameters_are_wrapped() {
        let tool = ToolDefinition::new("echo", "Echo", json!({"type": "string"}));
        let params = tool.normalized_parameters();
        assert_eq!(params["type"], "object");
        assert_eq!(params["properties"]["input"]["type"], "string");
        assert_eq!(params["required"], json!(["input"]));
    }

    #[test]
    fn test_object_parameters_untouched() {
        let schema = json!({"properties": {"q": {"type": "string"}}});
        let tool = ToolDefinition::new("search", "Search", schema.clone());
        assert_eq!(tool.normalized_parameters(), schema);
    }

    #[test]
    fn test_assistant_with_tool_calls_skips_empty_text() {
        let call = ToolCall {
            tool_call_id: "call_1".into(),
            tool_name: "search".into(),
            input: json!({"q": "rust"}),
        };
        let msg = Message::assistant_with_tool_calls("", vec![call.clone()]);
        assert_eq!(msg.parts, vec![Part::ToolCall(call)]);
        assert!(msg.as_text().is_none());
    }

    #[test]
    fn test_result_text_unquotes_strings() {
        let msg = Message::tool_response("c1", "search", json!("plain"));
        assert_eq!(msg.tool_responses()[0].result_text(), "plain");
        let msg = Message::tool_response("c1", "search", json!({"a": 1}));
        assert_eq!(msg.tool_responses()[0].result_text(), r#"{"a":1}"#);
    }
}
