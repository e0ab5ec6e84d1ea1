//! Conversions between chatbridge types and the provider's wire types.
//!
//! Outgoing: messages, tools, sampling options and response formats.
//! Incoming: full responses and stream chunks, which are reduced to
//! [`ProviderDelta`]s here so nothing past this module looks at the raw
//! chunk shape.

use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessage,
    ChatCompletionRequestToolMessageContent, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTools, CompletionUsage, CreateChatCompletionRequest,
    CreateChatCompletionResponse, CreateChatCompletionStreamResponse, FunctionCall,
    ResponseFormat, ResponseFormatJsonSchema,
};
use chatbridge_parsers::{ObjectSchema, ToolCallAccumulator, ToolCallDelta};
use chatbridge_types::{
    FinishReason, LlmError, Message, MessageRole, SamplingOptions, TextResponse, ToolDefinition,
    Usage,
};
use serde_json::json;

pub fn map_messages(messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
    let mut mapped = Vec::with_capacity(messages.len());
    for m in messages {
        match m.role {
            MessageRole::User => {
                let mut msg = ChatCompletionRequestUserMessageArgs::default();
                msg.content(m.as_text().unwrap_or_default());
                if let Some(name) = &m.name {
                    msg.name(name);
                }
                mapped.push(ChatCompletionRequestMessage::User(msg.build()?));
            }
            MessageRole::System => {
                let mut msg = ChatCompletionRequestSystemMessageArgs::default();
                msg.content(m.as_text().unwrap_or_default());
                if let Some(name) = &m.name {
                    msg.name(name);
                }
                mapped.push(ChatCompletionRequestMessage::System(msg.build()?));
            }
            MessageRole::Assistant => {
                let mut msg = ChatCompletionRequestAssistantMessageArgs::default();
                if let Some(content) = m.as_text() {
                    msg.content(content);
                }
                if let Some(name) = &m.name {
                    msg.name(name);
                }
                let tool_calls = m.tool_calls();
                if !tool_calls.is_empty() {
                    let tool_calls = tool_calls
                        .iter()
                        .map(|tc| {
                            Ok(ChatCompletionMessageToolCalls::Function(
                                ChatCompletionMessageToolCall {
                                    id: tc.tool_call_id.clone(),
                                    function: FunctionCall {
                                        name: tc.tool_name.clone(),
                                        arguments: serde_json::to_string(&tc.input)?,
                                    },
                                },
                            ))
                        })
                        .collect::<Result<Vec<_>, LlmError>>()?;
                    msg.tool_calls(tool_calls);
                }
                mapped.push(ChatCompletionRequestMessage::Assistant(msg.build()?));
            }
            MessageRole::Tool => {
                for response in m.tool_responses() {
                    mapped.push(ChatCompletionRequestMessage::Tool(
                        ChatCompletionRequestToolMessage {
                            content: ChatCompletionRequestToolMessageContent::Text(
                                response.result_text(),
                            ),
                            tool_call_id: response.tool_call_id.clone(),
                        },
                    ));
                }
            }
        }
    }
    Ok(mapped)
}

pub fn map_tools(tools: &[ToolDefinition]) -> Option<Vec<ChatCompletionTools>> {
    if tools.is_empty() {
        return None;
    }
    Some(tools.iter().cloned().map(Into::into).collect())
}

pub fn json_schema_format(schema: &ObjectSchema) -> ResponseFormat {
    ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
            description: None,
            name: schema.name().to_string(),
            schema: Some(schema.to_provider_schema()),
            strict: Some(true),
        },
    }
}

/// System turn used when the provider cannot constrain decoding itself.
pub fn schema_instruction(schema: &ObjectSchema) -> Result<Message, LlmError> {
    let schema_text = serde_json::to_string_pretty(schema.schema())?;
    Ok(Message::system(format!(
        "Respond with a single JSON value that conforms to the JSON schema below. \
         Output only the JSON, with no explanation and no code fences.\n\n{schema_text}"
    )))
}

/// Set resolved sampling options on the request body.
pub fn apply_sampling(
    request: CreateChatCompletionRequest,
    sampling: &SamplingOptions,
) -> Result<CreateChatCompletionRequest, LlmError> {
    let mut body = serde_json::to_value(&request)?;

    body["temperature"] = json!(sampling.temperature);
    if let Some(top_p) = sampling.top_p {
        body["top_p"] = json!(top_p);
    }
    if let Some(max_tokens) = sampling.max_tokens {
        body["max_completion_tokens"] = json!(max_tokens);
    }
    if let Some(stop) = &sampling.stop {
        body["stop"] = json!(stop);
    }
    if let Some(freq) = sampling.frequency_penalty {
        body["frequency_penalty"] = json!(freq);
    }
    if let Some(pres) = sampling.presence_penalty {
        body["presence_penalty"] = json!(pres);
    }

    Ok(serde_json::from_value(body)?)
}

pub fn map_usage(usage: &CompletionUsage) -> Usage {
    Usage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    }
}

fn default_finish_reason(has_tool_calls: bool) -> FinishReason {
    if has_tool_calls {
        FinishReason::ToolCalls
    } else {
        FinishReason::Stop
    }
}

/// Content, tool calls and usage of the first choice.
pub fn map_response(response: CreateChatCompletionResponse) -> Result<TextResponse, LlmError> {
    let usage = response.usage.as_ref().map(map_usage);
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(LlmError::EmptyResponse);
    };

    let content = choice.message.content.unwrap_or_default();
    let mut accumulator = ToolCallAccumulator::new();
    for (index, tool_call) in choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
    {
        let (id, name, arguments) = match tool_call {
            ChatCompletionMessageToolCalls::Function(tool_call) => (
                tool_call.id,
                tool_call.function.name,
                tool_call.function.arguments,
            ),
            ChatCompletionMessageToolCalls::Custom(tool_call) => (
                tool_call.id,
                tool_call.custom_tool.name,
                tool_call.custom_tool.input,
            ),
        };
        tracing::debug!(
            target: "llm.tool_call",
            "Received tool_call_id from provider: {:?} for tool {}",
            id,
            name
        );
        let index = u32::try_from(index).map_err(|_| LlmError::InvalidToolCallSlot(u32::MAX))?;
        accumulator.apply(ToolCallDelta {
            index,
            id: Some(id),
            name: Some(name),
            arguments: Some(arguments),
        })?;
    }
    let tool_calls = accumulator.finish();

    if content.is_empty() && tool_calls.is_empty() {
        return Err(LlmError::EmptyResponse);
    }

    let finish_reason = choice
        .finish_reason
        .map(FinishReason::from)
        .unwrap_or_else(|| default_finish_reason(!tool_calls.is_empty()));

    Ok(TextResponse {
        content,
        tool_calls,
        finish_reason,
        usage,
    })
}

/// One validated piece of a stream chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderDelta {
    Text(String),
    ToolCall(ToolCallDelta),
    Finish(FinishReason),
    Usage(Usage),
}

/// Split a chunk into deltas. Requests are single-choice, so only the first
/// choice is read.
pub fn chunk_deltas(chunk: CreateChatCompletionStreamResponse) -> Vec<ProviderDelta> {
    let mut deltas = Vec::new();

    if chunk.choices.len() > 1 {
        tracing::debug!(
            "Chunk carried {} choices; reading the first",
            chunk.choices.len()
        );
    }

    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                deltas.push(ProviderDelta::Text(content));
            }
        }
        for tool_call in choice.delta.tool_calls.unwrap_or_default() {
            let (name, arguments) = match tool_call.function {
                Some(function) => (function.name, function.arguments),
                None => (None, None),
            };
            deltas.push(ProviderDelta::ToolCall(ToolCallDelta {
                index: tool_call.index,
                id: tool_call.id,
                name,
                arguments,
            }));
        }
        if let Some(reason) = choice.finish_reason {
            deltas.push(ProviderDelta::Finish(reason.into()));
        }
    }

    if let Some(usage) = &chunk.usage {
        deltas.push(ProviderDelta::Usage(map_usage(usage)));
    }

    deltas
}

/// Finish reason for a completed stream that may not have reported one.
pub fn stream_finish_reason(reported: Option<FinishReason>, has_tool_calls: bool) -> FinishReason {
    reported.unwrap_or_else(|| default_finish_reason(has_tool_calls))
}
