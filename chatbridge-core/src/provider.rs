use std::{collections::HashMap, pin::Pin};

use async_openai::{
    Client,
    error::OpenAIError,
    types::chat::{
        CreateChatCompletionRequest, CreateChatCompletionResponse,
        CreateChatCompletionStreamResponse,
    },
};
use chatbridge_types::{LlmDefinition, LlmError};
use futures::{Stream, StreamExt};

use crate::provider_config::{LABEL_HEADER, ProviderConfig};

pub type ChatCompletionStream =
    Pin<Box<dyn Stream<Item = Result<CreateChatCompletionStreamResponse, LlmError>> + Send>>;

/// Transport for chat-completion calls.
#[async_trait::async_trait]
pub trait ChatCompletionProvider: Send + Sync + std::fmt::Debug {
    async fn create(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, LlmError>;

    async fn create_stream(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<ChatCompletionStream, LlmError>;
}

#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    client: Client<ProviderConfig>,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: Client::with_config(config),
        }
    }

    pub fn from_definition(llm_def: &LlmDefinition, api_key: Option<String>) -> Self {
        let headers = HashMap::from([(LABEL_HEADER.to_string(), llm_def.name.clone())]);
        let config = ProviderConfig::for_provider(&llm_def.model_settings.provider, api_key)
            .with_additional_headers(headers);
        Self::new(config)
    }
}

#[async_trait::async_trait]
impl ChatCompletionProvider for OpenAIProvider {
    async fn create(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, LlmError> {
        self.client.chat().create(request).await.map_err(|e| {
            tracing::error!("LLM request failed: {}", e);
            LlmError::Provider(e)
        })
    }

    async fn create_stream(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<ChatCompletionStream, LlmError> {
        let stream = self.client.chat().create_stream(request).await.map_err(|e| {
            tracing::error!("LLM stream request failed: {}", e);
            LlmError::Provider(e)
        })?;
        Ok(Box::pin(stream.map(|chunk| chunk.map_err(stream_error))))
    }
}

/// Errors on an open stream. A broken event stream becomes
/// [`LlmError::Stream`]; API errors sent as events stay provider errors.
pub(crate) fn stream_error(e: OpenAIError) -> LlmError {
    match e {
        OpenAIError::StreamError(e) => {
            tracing::error!("LLM stream broke: {}", e);
            LlmError::Stream(e.to_string())
        }
        other => {
            tracing::error!("LLM stream returned an error: {}", other);
            LlmError::Provider(other)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::error::StreamError;

    #[test]
    fn test_broken_event_stream_is_stream_error() {
        let err = stream_error(OpenAIError::StreamError(Box::new(StreamError::EventStream(
            "connection reset".into(),
        ))));
        assert!(matches!(err, LlmError::Stream(ref msg) if msg.contains("connection reset")));
    }

    #[test]
    fn test_api_error_event_stays_provider_error() {
        let err = stream_error(OpenAIError::InvalidArgument("bad model".into()));
        assert!(matches!(err, LlmError::Provider(_)));
    }
}
