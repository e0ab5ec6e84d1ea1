#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider returned an empty response")]
    EmptyResponse,
    #[error("Failed to parse model output: {0}")]
    ParseFailure(String),
    #[error("{0}")]
    Provider(#[from] async_openai::error::OpenAIError),
    #[error("Tool call slot {0} is out of range")]
    InvalidToolCallSlot(u32),
    #[error("Invalid stream state: {0}")]
    InvalidState(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Stream error: {0}")]
    Stream(String),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl LlmError {
    /// Hard failures of the final parse, as opposed to transport or setup errors.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, LlmError::EmptyResponse | LlmError::ParseFailure(_))
    }
}
