use std::{collections::HashMap, str::FromStr};

use async_openai::config::Config;
use chatbridge_types::{ENV_API_BASE, ENV_API_KEY, ModelProvider};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Project header
pub const PROJECT_HEADER: &str = "OpenAI-Project";

/// Label header, set to the model definition name
pub const LABEL_HEADER: &str = "X-Label";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    api_base: String,
    #[serde(skip)]
    api_key: SecretString,
    project_id: String,
    additional_headers: Option<HashMap<String, String>>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: std::env::var(ENV_API_BASE)
                .unwrap_or_else(|_| ModelProvider::openai_base_url()),
            api_key: std::env::var(ENV_API_KEY)
                .unwrap_or_else(|_| "".to_string())
                .into(),
            project_id: "".to_string(),
            additional_headers: None,
        }
    }
}

impl ProviderConfig {
    /// Base URL from `OPENAI_API_BASE` (or the public endpoint) and key from `OPENAI_API_KEY`
    pub fn new() -> Self {
        Default::default()
    }

    /// Build the config for a provider entry. A key set on the provider wins
    /// over `api_key`, which in turn wins over the environment.
    pub fn for_provider(provider: &ModelProvider, api_key: Option<String>) -> Self {
        let mut config = Self::default().with_api_base(provider.base_url());
        if let Some(api_key) = api_key {
            config = config.with_api_key(api_key);
        }
        if let ModelProvider::OpenAICompatible {
            api_key,
            project_id,
            ..
        } = provider
        {
            if let Some(api_key) = api_key {
                config = config.with_api_key(api_key.clone());
            }
            if let Some(project_id) = project_id {
                config = config.with_project_id(project_id.clone());
            }
        }
        config
    }

    pub fn with_project_id<S: Into<String>>(mut self, project_id: S) -> Self {
        self.project_id = project_id.into();
        self
    }

    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = SecretString::from(api_key.into());
        self
    }

    pub fn with_api_base<S: Into<String>>(mut self, api_base: S) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_additional_headers(mut self, additional_headers: HashMap<String, String>) -> Self {
        self.additional_headers = Some(additional_headers);
        self
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    match (HeaderName::from_str(name), HeaderValue::from_str(value)) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => tracing::warn!("Skipping invalid header {name}"),
    }
}

impl Config for ProviderConfig {
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if !self.project_id.is_empty() {
            insert_header(&mut headers, PROJECT_HEADER, &self.project_id);
        }

        let secret = self.api_key.expose_secret();
        if !secret.is_empty() {
            insert_header(
                &mut headers,
                AUTHORIZATION.as_str(),
                &format!("Bearer {}", secret),
            );
        }

        if let Some(additional_headers) = &self.additional_headers {
            for (key, value) in additional_headers.iter() {
                insert_header(&mut headers, key, value);
            }
        }

        headers
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn api_base(&self) -> &str {
        &self.api_base
    }

    fn api_key(&self) -> &secrecy::SecretBox<str> {
        &self.api_key
    }

    fn query(&self) -> Vec<(&str, &str)> {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers() {
        let config = ProviderConfig::default()
            .with_api_base("http://localhost:8080/v1/")
            .with_api_key("sk-test")
            .with_project_id("proj_1")
            .with_additional_headers(HashMap::from([
                (LABEL_HEADER.to_string(), "writer".to_string()),
                ("bad header".to_string(), "x".to_string()),
            ]));

        let headers = config.headers();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer sk-test");
        assert_eq!(headers.get(PROJECT_HEADER).unwrap(), "proj_1");
        assert_eq!(headers.get(LABEL_HEADER).unwrap(), "writer");
        assert_eq!(headers.len(), 3);
        assert_eq!(
            config.url("/chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_provider_key_wins() {
        let provider = ModelProvider::OpenAICompatible {
            base_url: "http://gateway/v1".to_string(),
            api_key: Some("provider-key".to_string()),
            project_id: None,
        };
        let config = ProviderConfig::for_provider(&provider, Some("config-key".to_string()));
        assert_eq!(config.api_key().expose_secret(), "provider-key");
        assert_eq!(config.api_base(), "http://gateway/v1");
        assert!(config.headers().get(PROJECT_HEADER).is_none());
    }
}
