pub mod convert;
pub mod llm;
pub mod log;
pub mod logging;
pub mod provider;
pub mod provider_config;

pub use llm::{ChatModel, ObjectStream, TextStream};
pub use provider::{ChatCompletionProvider, ChatCompletionStream, OpenAIProvider};
pub use provider_config::ProviderConfig;

pub mod types {
    pub use chatbridge_types::*;
}

pub mod parsers {
    pub use chatbridge_parsers::*;
}

#[cfg(test)]
mod tests;
