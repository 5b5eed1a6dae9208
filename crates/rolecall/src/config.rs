//! Serializable client and role configuration.
//!
//! Field names are camelCase on the wire (`apiKey`, `baseURL`, `maxTokens`,
//! `topP`). [`RolesConfig::from_file`] reads exactly the path it is given;
//! there is no file discovery or merging.

use crate::error::{LlmError, Result};
use crate::roles::Role;
use crate::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for a single provider/model client.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Provider name: `openai`, `anthropic`, or `local`.
    #[serde(default)]
    pub provider: String,
    /// Model identifier, e.g. `gpt-4o-mini`.
    #[serde(default)]
    pub model: String,
    /// API key. Falls back to the provider's environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Override for the provider's base URL.
    #[serde(
        rename = "baseURL",
        alias = "baseUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Transport timeout in milliseconds (minimum 1000).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl ClientConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_timeout_ms(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Configured temperature or the crate default.
    pub fn effective_temperature(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    /// Configured completion budget or the crate default.
    pub fn effective_max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    /// Configured transport timeout or the crate default.
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout.unwrap_or(DEFAULT_TIMEOUT_MS))
    }
}

/// One client configuration per role.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RolesConfig {
    pub planner: ClientConfig,
    pub executor: ClientConfig,
    pub reflector: ClientConfig,
}

impl RolesConfig {
    /// The same configuration for all three roles.
    pub fn uniform(config: ClientConfig) -> Self {
        Self {
            planner: config.clone(),
            executor: config.clone(),
            reflector: config,
        }
    }

    pub fn for_role(&self, role: Role) -> &ClientConfig {
        match role {
            Role::Planner => &self.planner,
            Role::Executor => &self.executor,
            Role::Reflector => &self.reflector,
        }
    }

    /// Parse a JSON roles document.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| LlmError::Configuration(format!("invalid roles config: {e}")))
    }

    /// Read and parse a JSON roles file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            LlmError::Configuration(format!(
                "failed to read roles config '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn deserializes_external_field_names() {
        let config: ClientConfig = serde_json::from_str(
            r#"{
                "provider": "local",
                "model": "llama3.2",
                "apiKey": "k",
                "baseURL": "http://gpu-box:11434",
                "maxTokens": 512,
                "timeout": 30000,
                "topP": 0.9
            }"#,
        )
        .unwrap();
        assert_eq!(config.provider, "local");
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert_eq!(config.base_url.as_deref(), Some("http://gpu-box:11434"));
        assert_eq!(config.max_tokens, Some(512));
        assert_eq!(config.timeout_duration(), Duration::from_secs(30));
        assert_eq!(config.top_p, Some(0.9));
    }

    #[test]
    fn base_url_alias_accepted() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"provider":"openai","model":"gpt-4o","baseUrl":"http://x"}"#)
                .unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://x"));
    }

    #[test]
    fn effective_values_fall_back_to_defaults() {
        let config = ClientConfig::new("openai", "gpt-4o");
        assert_eq!(config.effective_temperature(), DEFAULT_TEMPERATURE);
        assert_eq!(config.effective_max_tokens(), DEFAULT_MAX_TOKENS);
        assert_eq!(
            config.timeout_duration(),
            Duration::from_millis(DEFAULT_TIMEOUT_MS)
        );

        let tuned = config.with_temperature(0.2).with_max_tokens(100);
        assert_eq!(tuned.effective_temperature(), 0.2);
        assert_eq!(tuned.effective_max_tokens(), 100);
    }

    #[test]
    fn roles_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "planner": {{"provider": "anthropic", "model": "claude-3-5-sonnet-20241022"}},
                "executor": {{"provider": "openai", "model": "gpt-4o-mini"}},
                "reflector": {{"provider": "local", "model": "llama3.2"}}
            }}"#
        )
        .unwrap();

        let roles = RolesConfig::from_file(file.path()).unwrap();
        assert_eq!(roles.for_role(Role::Planner).provider, "anthropic");
        assert_eq!(roles.for_role(Role::Executor).model, "gpt-4o-mini");
        assert_eq!(roles.for_role(Role::Reflector).provider, "local");
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RolesConfig::from_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, LlmError::Configuration(_)));
    }

    #[test]
    fn malformed_json_is_configuration_error() {
        let err = RolesConfig::from_json("{ not json").unwrap_err();
        assert!(err.to_string().contains("invalid roles config"));
    }
}
