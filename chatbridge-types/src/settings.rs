use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "name")]
pub enum ModelProvider {
    #[serde(rename = "openai")]
    OpenAI {},
    #[serde(rename = "openai_compat")]
    OpenAICompatible {
        base_url: String,
        api_key: Option<String>,
        project_id: Option<String>,
    },
}

impl Default for ModelProvider {
    fn default() -> Self {
        ModelProvider::OpenAI {}
    }
}

impl ModelProvider {
    pub fn openai_base_url() -> String {
        "https://api.openai.com/v1".to_string()
    }

    pub fn base_url(&self) -> String {
        match self {
            ModelProvider::OpenAI {} => Self::openai_base_url(),
            ModelProvider::OpenAICompatible { base_url, .. } => base_url.clone(),
        }
    }
}

/// Model-level defaults. Per-call [`CallOptions`] take precedence.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ModelSettings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub frequency_penalty: Option<f32>,
    #[serde(default)]
    pub presence_penalty: Option<f32>,
    #[serde(default)]
    pub provider: ModelProvider,
    /// Try schema-constrained decoding before falling back to repair.
    #[serde(default = "default_structured_outputs")]
    pub structured_outputs: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            top_p: None,
            max_tokens: None,
            stop: None,
            frequency_penalty: None,
            presence_penalty: None,
            provider: ModelProvider::default(),
            structured_outputs: default_structured_outputs(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_structured_outputs() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct LlmDefinition {
    /// Label used in logs and request headers.
    pub name: String,
    #[serde(default)]
    pub model_settings: ModelSettings,
}

impl LlmDefinition {
    pub fn new(name: impl Into<String>, model_settings: ModelSettings) -> Self {
        Self {
            name: name.into(),
            model_settings,
        }
    }
}

/// Per-call sampling overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CallOptions {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
}

impl CallOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn resolve(&self, settings: &ModelSettings) -> SamplingOptions {
        SamplingOptions {
            temperature: self.temperature.unwrap_or(settings.temperature),
            top_p: self.top_p.or(settings.top_p),
            max_tokens: self.max_tokens.or(settings.max_tokens),
            stop: self
                .stop
                .clone()
                .or_else(|| settings.stop.clone())
                .filter(|stop| !stop.is_empty()),
            frequency_penalty: self.frequency_penalty.or(settings.frequency_penalty),
            presence_penalty: self.presence_penalty.or(settings.presence_penalty),
        }
    }
}

/// Sampling options after merging per-call values over model defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_defaults_to_one() {
        let resolved = CallOptions::default().resolve(&ModelSettings::default());
        assert_eq!(resolved.temperature, 1.0);
        assert!(resolved.top_p.is_none());
        assert!(resolved.max_tokens.is_none());
        assert!(resolved.stop.is_none());
    }

    #[test]
    fn test_call_options_override_model_defaults() {
        let settings = ModelSettings {
            temperature: 0.2,
            max_tokens: Some(512),
            presence_penalty: Some(0.5),
            ..Default::default()
        };
        let resolved = CallOptions::default()
            .with_temperature(0.9)
            .with_stop(vec!["END".into()])
            .resolve(&settings);

        assert_eq!(resolved.temperature, 0.9);
        assert_eq!(resolved.max_tokens, Some(512));
        assert_eq!(resolved.presence_penalty, Some(0.5));
        assert_eq!(resolved.stop, Some(vec!["END".to_string()]));
    }

    #[test]
    fn test_empty_stop_list_is_dropped() {
        let resolved = CallOptions::default()
            .with_stop(vec![])
            .resolve(&ModelSettings::default());
        assert!(resolved.stop.is_none());
    }

    #[test]
    fn test_model_settings_from_toml() {
        let settings: ModelSettings = toml::from_str(
            r#"
model = "gpt-4o"
max_tokens = 256

[provider]
name = "openai_compat"
base_url = "http://localhost:8080/v1"
"#,
        )
        .unwrap();

        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.temperature, 1.0);
        assert_eq!(settings.max_tokens, Some(256));
        assert!(settings.structured_outputs);
        assert_eq!(settings.provider.base_url(), "http://localhost:8080/v1");
    }
}
