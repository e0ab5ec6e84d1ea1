use std::sync::Arc;

use async_openai::types::chat::{ChatCompletionStreamOptions, CreateChatCompletionRequest};
use chatbridge_parsers::{ObjectSchema, ObjectStreamState, ResponseParser, StreamState};
use chatbridge_types::{
    CallOptions, ChatStreamEvent, ChatbridgeConfig, FinishReason, GenerationMode, LlmDefinition,
    LlmError, Message, ObjectResponse, ObjectStreamEvent, TextResponse, ToolDefinition, Usage,
};
use futures::{Stream, StreamExt, stream::BoxStream};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::{
    convert::{self, ProviderDelta},
    log::ModelLogger,
    provider::{ChatCompletionProvider, ChatCompletionStream, OpenAIProvider},
};

pub type TextStream = BoxStream<'static, Result<ChatStreamEvent, LlmError>>;
pub type ObjectStream<T> = BoxStream<'static, Result<ObjectStreamEvent<T>, LlmError>>;

#[derive(Debug, Clone)]
pub struct ChatModel {
    llm_def: LlmDefinition,
    provider: Arc<dyn ChatCompletionProvider>,
    model_logger: ModelLogger,
}

impl ChatModel {
    pub fn new(llm_def: LlmDefinition, provider: Arc<dyn ChatCompletionProvider>) -> Self {
        let name = &llm_def.name;
        tracing::debug!(
            "Initializing LLM {name} with model {}",
            llm_def.model_settings.model
        );

        Self {
            llm_def,
            provider,
            model_logger: ModelLogger::new(None),
        }
    }

    /// Model backed by the OpenAI client, configured from `config`.
    pub fn from_config(config: &ChatbridgeConfig) -> Self {
        let provider = OpenAIProvider::from_definition(&config.llm, config.api_key.clone());
        Self::new(config.llm.clone(), Arc::new(provider))
    }

    pub fn with_model_logger(mut self, model_logger: ModelLogger) -> Self {
        self.model_logger = model_logger;
        self
    }

    pub fn get_llm_def(&self) -> &LlmDefinition {
        &self.llm_def
    }

    pub fn build_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &CallOptions,
        response_format: Option<&ObjectSchema>,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let settings = &self.llm_def.model_settings;
        tracing::debug!(
            "Building chat completion request with model: {}",
            settings.model
        );

        let mut request = CreateChatCompletionRequest {
            model: settings.model.clone(),
            messages: convert::map_messages(messages)?,
            tools: convert::map_tools(tools),
            response_format: response_format.map(convert::json_schema_format),
            ..Default::default()
        };
        if stream {
            request.stream = Some(true);
            request.stream_options = Some(ChatCompletionStreamOptions {
                include_usage: Some(true),
                include_obfuscation: None,
            });
        }

        let sampling = options.resolve(settings);
        let request = convert::apply_sampling(request, &sampling)?;

        self.model_logger.log_openai_messages(&request);
        Ok(request)
    }

    fn log_request(&self, kind: &str, request: &CreateChatCompletionRequest, tools: usize) {
        tracing::info!(
            target: "llm.execute",
            "LLM request ({kind}) model={}, provider={:?}, temperature={:?}, max_tokens={:?}, tools={} messages={}",
            request.model,
            self.llm_def.model_settings.provider,
            request.temperature,
            request.max_completion_tokens,
            tools,
            request.messages.len()
        );
        tracing::trace!(target: "llm.execute.messages", "Messages = {:?}", request.messages);
        self.model_logger.log_model_execution(
            &self.llm_def.name,
            &request.model,
            request.messages.len(),
            Some(kind),
            None,
        );
    }

    fn log_usage(&self, message_count: usize, usage: Option<&Usage>) {
        self.model_logger.log_model_execution(
            &self.llm_def.name,
            &self.llm_def.model_settings.model,
            message_count,
            None,
            usage,
        );
    }

    pub async fn generate_text(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &CallOptions,
    ) -> Result<TextResponse, LlmError> {
        let request = self.build_request(messages, tools, options, None, false)?;
        self.log_request("text", &request, tools.len());
        let message_count = request.messages.len();

        let response = self.provider.create(request).await?;
        let response = convert::map_response(response)?;
        self.log_usage(message_count, response.usage.as_ref());
        Ok(response)
    }

    pub async fn stream_text(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &CallOptions,
    ) -> Result<TextStream, LlmError> {
        let request = self.build_request(messages, tools, options, None, true)?;
        self.log_request("text stream", &request, tools.len());

        let chunks = self.provider.create_stream(request).await?;
        Ok(text_events(chunks).boxed())
    }

    pub async fn generate_object<T>(
        &self,
        messages: &[Message],
        options: &CallOptions,
    ) -> Result<ObjectResponse<T>, LlmError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        self.generate_object_with(&ResponseParser::for_type(), messages, options)
            .await
    }

    /// Structured generation against an explicit parser.
    ///
    /// Strict decoding is tried first when the model allows it; any failure
    /// there leads to exactly one unconstrained attempt that is repaired and
    /// validated locally.
    pub async fn generate_object_with<T: DeserializeOwned>(
        &self,
        parser: &ResponseParser<T>,
        messages: &[Message],
        options: &CallOptions,
    ) -> Result<ObjectResponse<T>, LlmError> {
        if self.llm_def.model_settings.structured_outputs {
            match self
                .object_attempt(parser, messages, options, GenerationMode::Strict)
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) if e.is_parse_error() => tracing::warn!(
                    target: "llm.object",
                    "Strict output for {} did not parse: {}; retrying unconstrained",
                    parser.schema().name(),
                    e
                ),
                Err(e) => tracing::warn!(
                    target: "llm.object",
                    "Strict request for {} failed: {}; retrying unconstrained",
                    parser.schema().name(),
                    e
                ),
            }
        }

        self.object_attempt(parser, messages, options, GenerationMode::Fallback)
            .await
    }

    fn object_request(
        &self,
        schema: &ObjectSchema,
        messages: &[Message],
        options: &CallOptions,
        mode: GenerationMode,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        match mode {
            GenerationMode::Strict => {
                self.build_request(messages, &[], options, Some(schema), stream)
            }
            GenerationMode::Fallback => {
                let mut with_instruction = Vec::with_capacity(messages.len() + 1);
                with_instruction.push(convert::schema_instruction(schema)?);
                with_instruction.extend_from_slice(messages);
                self.build_request(&with_instruction, &[], options, None, stream)
            }
        }
    }

    async fn object_attempt<T: DeserializeOwned>(
        &self,
        parser: &ResponseParser<T>,
        messages: &[Message],
        options: &CallOptions,
        mode: GenerationMode,
    ) -> Result<ObjectResponse<T>, LlmError> {
        let request = self.object_request(parser.schema(), messages, options, mode, false)?;
        self.log_request(mode_label(mode), &request, 0);
        let message_count = request.messages.len();

        let response = self.provider.create(request).await?;
        let response = convert::map_response(response)?;
        self.log_usage(message_count, response.usage.as_ref());

        let object = parser.parse_final(&response.content).inspect_err(|e| {
            self.model_logger.log_parsing_error(
                parser.schema().name(),
                &response.content,
                &e.to_string(),
            )
        })?;

        Ok(ObjectResponse {
            object,
            raw: response.content,
            usage: response.usage,
            mode,
        })
    }

    pub async fn stream_object<T>(
        &self,
        messages: &[Message],
        options: &CallOptions,
    ) -> Result<ObjectStream<T>, LlmError>
    where
        T: DeserializeOwned + JsonSchema + Send + 'static,
    {
        self.stream_object_with(ResponseParser::for_type(), messages, options)
            .await
    }

    /// Streamed structured generation. The strict stream is abandoned for a
    /// single unconstrained one when it cannot be opened or its first item is
    /// an error; failures after that surface on the stream.
    pub async fn stream_object_with<T>(
        &self,
        parser: ResponseParser<T>,
        messages: &[Message],
        options: &CallOptions,
    ) -> Result<ObjectStream<T>, LlmError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        if self.llm_def.model_settings.structured_outputs {
            match self
                .open_object_stream(parser.schema(), messages, options, GenerationMode::Strict)
                .await
            {
                Ok(chunks) => {
                    return Ok(object_events(parser, chunks, GenerationMode::Strict).boxed());
                }
                Err(e) => tracing::warn!(
                    target: "llm.object",
                    "Strict stream for {} failed: {}; retrying unconstrained",
                    parser.schema().name(),
                    e
                ),
            }
        }

        let chunks = self
            .open_object_stream(parser.schema(), messages, options, GenerationMode::Fallback)
            .await?;
        Ok(object_events(parser, chunks, GenerationMode::Fallback).boxed())
    }

    /// Open a stream and wait for its first item so early failures can
    /// still trigger the fallback.
    async fn open_object_stream(
        &self,
        schema: &ObjectSchema,
        messages: &[Message],
        options: &CallOptions,
        mode: GenerationMode,
    ) -> Result<ChatCompletionStream, LlmError> {
        let request = self.object_request(schema, messages, options, mode, true)?;
        self.log_request(mode_label(mode), &request, 0);

        let mut chunks = self.provider.create_stream(request).await?;
        let first = match chunks.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(e),
            None => return Err(LlmError::EmptyResponse),
        };
        Ok(futures::stream::once(async move { Ok(first) })
            .chain(chunks)
            .boxed())
    }
}

fn mode_label(mode: GenerationMode) -> &'static str {
    match mode {
        GenerationMode::Strict => "object strict",
        GenerationMode::Fallback => "object fallback",
    }
}

fn text_events(
    mut chunks: ChatCompletionStream,
) -> impl Stream<Item = Result<ChatStreamEvent, LlmError>> + Send + 'static {
    async_stream::stream! {
        let mut state = StreamState::new();
        let mut finish_reason: Option<FinishReason> = None;
        let mut usage: Option<Usage> = None;

        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::error!("LLM stream failed: {}", e);
                    state.fail();
                    yield Err(e);
                    return;
                }
            };

            for delta in convert::chunk_deltas(chunk) {
                match delta {
                    ProviderDelta::Text(text) => {
                        if let Err(e) = state.push_text(&text) {
                            yield Err(e);
                            return;
                        }
                        yield Ok(ChatStreamEvent::TextDelta { delta: text });
                    }
                    ProviderDelta::ToolCall(delta) => {
                        let index = delta.index;
                        let event = match state.push_tool_call(delta) {
                            Ok(slot) => ChatStreamEvent::FunctionCall {
                                index,
                                id: slot.id.clone(),
                                name: slot.name.clone(),
                                arguments: slot.arguments.clone(),
                                input: slot.input(),
                            },
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        };
                        yield Ok(event);
                    }
                    ProviderDelta::Finish(reason) => finish_reason = Some(reason),
                    ProviderDelta::Usage(reported) => usage = Some(reported),
                }
            }
        }

        let done = state.finish_with(|output| {
            if output.content.is_empty() && output.tool_calls.is_empty() {
                return Err(LlmError::EmptyResponse);
            }
            let has_tool_calls = !output.tool_calls.is_empty();
            Ok(ChatStreamEvent::Done {
                finish_reason: convert::stream_finish_reason(finish_reason, has_tool_calls),
                tool_calls: output.tool_calls,
                usage,
            })
        });
        yield done;
    }
}

fn object_events<T>(
    parser: ResponseParser<T>,
    mut chunks: ChatCompletionStream,
    mode: GenerationMode,
) -> impl Stream<Item = Result<ObjectStreamEvent<T>, LlmError>> + Send + 'static
where
    T: DeserializeOwned + Send + 'static,
{
    async_stream::stream! {
        let mut state = ObjectStreamState::new(parser);
        let mut usage: Option<Usage> = None;

        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::error!("LLM stream failed: {}", e);
                    yield Err(e);
                    return;
                }
            };

            for delta in convert::chunk_deltas(chunk) {
                match delta {
                    ProviderDelta::Text(text) => match state.push(&text) {
                        Ok(Some(partial)) => yield Ok(ObjectStreamEvent::Partial(partial)),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    },
                    ProviderDelta::Usage(reported) => usage = Some(reported),
                    ProviderDelta::ToolCall(_) | ProviderDelta::Finish(_) => {}
                }
            }
        }

        yield state.finish().map(|(object, raw)| {
            ObjectStreamEvent::Final(ObjectResponse {
                object,
                raw,
                usage,
                mode,
            })
        });
    }
}
