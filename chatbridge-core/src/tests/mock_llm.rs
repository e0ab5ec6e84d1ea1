#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_openai::{
    error::{OpenAIError, StreamError},
    types::chat::{
        CreateChatCompletionRequest, CreateChatCompletionResponse,
        CreateChatCompletionStreamResponse,
    },
};
use futures::StreamExt;
use serde_json::{Value, json};

use crate::provider::{ChatCompletionProvider, ChatCompletionStream, stream_error};
use crate::types::LlmError;

/// One scripted provider answer, consumed in call order.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Full (non-streamed) response body
    Response(Value),
    /// Stream chunks delivered in order
    Chunks(Vec<Value>),
    /// Stream that delivers `chunks` and then fails
    StreamError { chunks: Vec<Value>, error: String },
    /// The request itself is rejected
    Error(String),
}

#[derive(Debug, Default)]
pub struct MockProvider {
    replies: Mutex<VecDeque<MockReply>>,
    pub requests: Mutex<Vec<CreateChatCompletionRequest>>,
}

impl MockProvider {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(vec![]),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Serialized body of the n-th request
    pub fn request_body(&self, n: usize) -> Value {
        serde_json::to_value(&self.requests.lock().unwrap()[n]).unwrap()
    }

    fn next_reply(&self, request: CreateChatCompletionRequest) -> Result<MockReply, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::InvalidState("no scripted reply left".to_string()))
    }
}

fn provider_error(message: String) -> LlmError {
    LlmError::Provider(OpenAIError::InvalidArgument(message))
}

fn broken_stream(message: String) -> LlmError {
    stream_error(OpenAIError::StreamError(Box::new(StreamError::EventStream(
        message,
    ))))
}

fn to_chunks(chunks: Vec<Value>) -> Result<Vec<CreateChatCompletionStreamResponse>, LlmError> {
    chunks
        .into_iter()
        .map(|chunk| serde_json::from_value(chunk).map_err(LlmError::from))
        .collect()
}

#[async_trait::async_trait]
impl ChatCompletionProvider for MockProvider {
    async fn create(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, LlmError> {
        match self.next_reply(request)? {
            MockReply::Response(body) => Ok(serde_json::from_value(body)?),
            MockReply::Error(message) => Err(provider_error(message)),
            other => panic!("expected a non-streamed reply, scripted {other:?}"),
        }
    }

    async fn create_stream(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<ChatCompletionStream, LlmError> {
        match self.next_reply(request)? {
            MockReply::Chunks(chunks) => {
                let chunks = to_chunks(chunks)?;
                Ok(futures::stream::iter(chunks.into_iter().map(Ok)).boxed())
            }
            MockReply::StreamError { chunks, error } => {
                let chunks = to_chunks(chunks)?;
                Ok(futures::stream::iter(chunks.into_iter().map(Ok))
                    .chain(futures::stream::iter(vec![Err(broken_stream(error))]))
                    .boxed())
            }
            MockReply::Error(message) => Err(provider_error(message)),
            other => panic!("expected a streamed reply, scripted {other:?}"),
        }
    }
}

pub fn text_response(content: &str) -> Value {
    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 0,
        "model": "mock",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

pub fn tool_call_response(id: &str, name: &str, arguments: &str) -> Value {
    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 0,
        "model": "mock",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": id,
                    "type": "function",
                    "function": {"name": name, "arguments": arguments}
                }]
            },
            "finish_reason": "tool_calls"
        }]
    })
}

fn chunk(choices: Value) -> Value {
    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "created": 0,
        "model": "mock",
        "choices": choices
    })
}

pub fn content_chunk(content: &str) -> Value {
    chunk(json!([{"index": 0, "delta": {"content": content}, "finish_reason": null}]))
}

pub fn tool_chunk(index: u32, id: Option<&str>, name: Option<&str>, arguments: &str) -> Value {
    chunk(json!([{
        "index": 0,
        "delta": {
            "tool_calls": [{
                "index": index,
                "id": id,
                "type": "function",
                "function": {"name": name, "arguments": arguments}
            }]
        },
        "finish_reason": null
    }]))
}

pub fn finish_chunk(reason: &str) -> Value {
    chunk(json!([{"index": 0, "delta": {}, "finish_reason": reason}]))
}

pub fn usage_chunk(prompt_tokens: u32, completion_tokens: u32) -> Value {
    let mut value = chunk(json!([]));
    value["usage"] = json!({
        "prompt_tokens": prompt_tokens,
        "completion_tokens": completion_tokens,
        "total_tokens": prompt_tokens + completion_tokens
    });
    value
}

/// Content split into chunks of `width` chars, followed by a stop chunk.
pub fn text_chunks(content: &str, width: usize) -> Vec<Value> {
    let chars: Vec<char> = content.chars().collect();
    let mut chunks: Vec<Value> = chars
        .chunks(width)
        .map(|piece| content_chunk(&piece.iter().collect::<String>()))
        .collect();
    chunks.push(finish_chunk("stop"));
    chunks
}
