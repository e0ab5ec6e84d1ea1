use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::LlmError;
use crate::settings::{LlmDefinition, ModelProvider};

/// Environment variable overriding the configured model
pub const ENV_MODEL: &str = "CHATBRIDGE_MODEL";

/// Environment variable for the provider API key
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";

/// Environment variable overriding the provider base URL
pub const ENV_API_BASE: &str = "OPENAI_API_BASE";

const CONFIG_DIR_NAME: &str = ".chatbridge";
const CONFIG_FILE_NAME: &str = "config.toml";
const LOCAL_CONFIG_FILE_NAME: &str = "chatbridge.toml";

/// Resolved configuration for a chatbridge client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatbridgeConfig {
    #[serde(default = "default_llm")]
    pub llm: LlmDefinition,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_llm() -> LlmDefinition {
    LlmDefinition {
        name: "chatbridge".to_string(),
        ..Default::default()
    }
}

impl Default for ChatbridgeConfig {
    fn default() -> Self {
        Self {
            llm: default_llm(),
            api_key: None,
        }
    }
}

fn normalize_optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn normalize_base_url(value: String) -> Option<String> {
    normalize_optional(value).map(|s| s.trim_end_matches('/').to_string())
}

impl ChatbridgeConfig {
    /// Path to the user config file (`~/.chatbridge/config.toml`).
    pub fn user_config_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"))?;
        let mut path = PathBuf::from(home);
        path.push(CONFIG_DIR_NAME);
        path.push(CONFIG_FILE_NAME);
        Some(path)
    }

    /// `./chatbridge.toml` if present, else the user config file.
    pub fn default_path() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        Self::user_config_path().filter(|p| p.exists())
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, LlmError> {
        toml::from_str(contents).map_err(|e| LlmError::InvalidConfiguration(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, LlmError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            LlmError::InvalidConfiguration(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Load configuration.
    ///
    /// Precedence: environment variables > config file > defaults.
    /// An explicitly passed path must exist; the default locations are optional.
    ///
    /// - `CHATBRIDGE_MODEL`: model name
    /// - `OPENAI_API_KEY`: API key
    /// - `OPENAI_API_BASE`: base URL, switches the provider to `openai_compat`
    pub fn load(path: Option<&Path>) -> Result<Self, LlmError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        Ok(config.apply_env())
    }

    fn apply_env(mut self) -> Self {
        if let Some(model) = std::env::var(ENV_MODEL).ok().and_then(normalize_optional) {
            self.llm.model_settings.model = model;
        }
        if let Some(api_key) = std::env::var(ENV_API_KEY).ok().and_then(normalize_optional) {
            self.api_key = Some(api_key);
        }
        if let Some(base_url) = std::env::var(ENV_API_BASE).ok().and_then(normalize_base_url) {
            let (api_key, project_id) = match &self.llm.model_settings.provider {
                ModelProvider::OpenAICompatible {
                    api_key,
                    project_id,
                    ..
                } => (api_key.clone(), project_id.clone()),
                ModelProvider::OpenAI {} => (None, None),
            };
            self.llm.model_settings.provider = ModelProvider::OpenAICompatible {
                base_url,
                api_key,
                project_id,
            };
        }
        tracing::debug!(
            "Loaded config for model {} ({})",
            self.llm.model_settings.model,
            self.llm.model_settings.provider.base_url()
        );
        self
    }
}
