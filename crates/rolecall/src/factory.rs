//! Config validation, credential resolution, and client construction.
//!
//! Credentials come from the config's `apiKey` first and the provider's
//! environment variable second. The environment is passed in as an explicit
//! [`Environment`] snapshot so resolution is deterministic under test.

use crate::api::transport::{ReqwestTransport, Transport};
use crate::client::LlmClient;
use crate::config::ClientConfig;
use crate::error::{LlmError, Result};
use crate::providers::Provider;
use crate::TEMPERATURE_RANGE;
use std::collections::HashMap;
use std::ffi::OsString;
use std::sync::Arc;
use tracing::debug;

/// Smallest accepted transport timeout.
pub const MIN_TIMEOUT_MS: u64 = 1000;

/// A snapshot of environment variables.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Capture the current process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 are left out.
    pub fn from_process() -> Self {
        Self::from_os_pairs(std::env::vars_os())
    }

    fn from_os_pairs(pairs: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        Self {
            vars: pairs
                .into_iter()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of `name`, treating blank values as unset.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// API key for `config`: its own `apiKey`, else the provider's variable.
///
/// Returns `None` for unknown providers and when neither source is set.
pub fn resolve_credential(config: &ClientConfig, env: &Environment) -> Option<String> {
    if let Some(key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        return Some(key.to_string());
    }
    let provider: Provider = config.provider.parse().ok()?;
    env.get(provider.api_key_env()).map(str::to_string)
}

/// Check `config` and return the parsed provider, or the first violation.
pub fn validate(config: &ClientConfig, env: &Environment) -> Result<Provider> {
    if config.provider.trim().is_empty() {
        return Err(LlmError::Configuration("provider is required".into()));
    }
    let provider: Provider = config.provider.parse()?;

    if config.model.trim().is_empty() {
        return Err(LlmError::Configuration(format!(
            "model is required for provider '{provider}'"
        )));
    }

    if provider.requires_api_key() && resolve_credential(config, env).is_none() {
        return Err(LlmError::Configuration(format!(
            "{provider} API key is required (set apiKey or {})",
            provider.api_key_env()
        )));
    }

    if let Some(t) = config.temperature
        && !TEMPERATURE_RANGE.contains(&t)
    {
        return Err(LlmError::Configuration(format!(
            "temperature must be between 0 and 2, got {t}"
        )));
    }

    if config.max_tokens == Some(0) {
        return Err(LlmError::Configuration(
            "maxTokens must be at least 1".into(),
        ));
    }

    if let Some(ms) = config.timeout
        && ms < MIN_TIMEOUT_MS
    {
        return Err(LlmError::Configuration(format!(
            "timeout must be at least {MIN_TIMEOUT_MS} ms, got {ms}"
        )));
    }

    if let Some(p) = config.top_p
        && !(0.0..=1.0).contains(&p)
    {
        return Err(LlmError::Configuration(format!(
            "topP must be between 0 and 1, got {p}"
        )));
    }

    Ok(provider)
}

/// Builds validated [`LlmClient`]s.
pub struct ClientFactory;

impl ClientFactory {
    /// Validate `config` against the process environment and build a client
    /// with a `reqwest` transport.
    pub fn create(config: &ClientConfig) -> Result<LlmClient> {
        let env = Environment::from_process();
        validate(config, &env)?;
        let transport = ReqwestTransport::new(config.timeout_duration()).map_err(|e| {
            LlmError::Configuration(format!("failed to initialize HTTP transport: {e}"))
        })?;
        Self::create_with(config, &env, Arc::new(transport))
    }

    /// Validate `config` against `env` and build a client on `transport`.
    pub fn create_with(
        config: &ClientConfig,
        env: &Environment,
        transport: Arc<dyn Transport>,
    ) -> Result<LlmClient> {
        let provider = validate(config, env)?;
        let api_key = resolve_credential(config, env);
        debug!(
            "Creating {provider} client: model={}, key={}",
            config.model,
            if api_key.is_some() { "set" } else { "none" }
        );
        Ok(LlmClient::new(config.clone(), provider, api_key, transport))
    }

    /// Whether `name` is a supported provider (case-insensitive).
    pub fn is_supported(name: &str) -> bool {
        name.parse::<Provider>().is_ok()
    }

    pub fn supported_providers() -> &'static [Provider] {
        &Provider::ALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::{HttpReply, HttpRequest, StreamingReply, TransportError};
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn send(&self, _: HttpRequest) -> std::result::Result<HttpReply, TransportError> {
            unreachable!("factory tests never send")
        }
        async fn send_streaming(
            &self,
            _: HttpRequest,
        ) -> std::result::Result<StreamingReply, TransportError> {
            unreachable!("factory tests never send")
        }
    }

    fn no_env() -> Environment {
        Environment::default()
    }

    fn config_error(config: &ClientConfig, env: &Environment) -> String {
        match validate(config, env) {
            Err(LlmError::Configuration(msg)) => msg,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn config_key_wins_over_environment() {
        let env = Environment::from_pairs([("OPENAI_API_KEY", "from-env")]);
        let config = ClientConfig::new("openai", "gpt-4o").with_api_key("from-config");
        assert_eq!(resolve_credential(&config, &env).as_deref(), Some("from-config"));

        let config = ClientConfig::new("openai", "gpt-4o");
        assert_eq!(resolve_credential(&config, &env).as_deref(), Some("from-env"));
    }

    #[test]
    fn blank_values_count_as_absent() {
        let env = Environment::from_pairs([("ANTHROPIC_API_KEY", "   ")]);
        let config = ClientConfig::new("anthropic", "claude-3-haiku-20240307").with_api_key("");
        assert_eq!(resolve_credential(&config, &env), None);
        assert!(config_error(&config, &env).contains("ANTHROPIC_API_KEY"));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_variables_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let env = Environment::from_os_pairs([
            (OsString::from("OPENAI_API_KEY"), OsString::from("sk-openai")),
            (OsString::from("BINARY_VALUE"), OsString::from_vec(b"f\xffo".to_vec())),
            (OsString::from_vec(b"BAD\xffNAME".to_vec()), OsString::from("x")),
        ]);
        assert_eq!(env.get("OPENAI_API_KEY"), Some("sk-openai"));
        assert_eq!(env.get("BINARY_VALUE"), None);
        assert_eq!(env.vars.len(), 1);

        let config = ClientConfig::new("openai", "gpt-4o-mini");
        let client = ClientFactory::create_with(&config, &env, Arc::new(Unreachable)).unwrap();
        assert_eq!(client.provider(), Provider::OpenAi);
    }

    #[test]
    fn process_snapshot_builds_local_client() {
        let client = ClientFactory::create(&ClientConfig::new("local", "llama3.2")).unwrap();
        assert_eq!(client.provider(), Provider::Local);
    }

    #[test]
    fn local_needs_no_key_but_reads_one() {
        let config = ClientConfig::new("local", "llama3.2");
        assert_eq!(validate(&config, &no_env()).unwrap(), Provider::Local);

        let env = Environment::from_pairs([("LOCAL_LLM_API_KEY", "lk")]);
        assert_eq!(resolve_credential(&config, &env).as_deref(), Some("lk"));
    }

    #[test]
    fn first_violation_is_reported() {
        assert!(config_error(&ClientConfig::new("", "m"), &no_env()).contains("provider"));
        assert!(config_error(&ClientConfig::new("gemini", "m"), &no_env()).contains("'gemini'"));
        assert!(config_error(&ClientConfig::new("local", ""), &no_env()).contains("model"));

        let base = ClientConfig::new("local", "llama3.2");
        assert!(config_error(&base.clone().with_temperature(2.5), &no_env()).contains("temperature"));
        assert!(config_error(&base.clone().with_max_tokens(0), &no_env()).contains("maxTokens"));
        assert!(config_error(&base.clone().with_timeout_ms(999), &no_env()).contains("timeout"));
        assert!(config_error(&base.clone().with_top_p(1.5), &no_env()).contains("topP"));
        assert!(validate(&base.with_timeout_ms(1000).with_top_p(1.0), &no_env()).is_ok());
    }

    #[test]
    fn create_with_builds_client() {
        let env = Environment::from_pairs([("ANTHROPIC_API_KEY", "sk-ant")]);
        let config = ClientConfig::new("Anthropic", "claude-3-5-sonnet-20241022");
        let client = ClientFactory::create_with(&config, &env, Arc::new(Unreachable)).unwrap();
        assert_eq!(client.provider(), Provider::Anthropic);
        assert_eq!(client.model(), "claude-3-5-sonnet-20241022");
        assert!(client.estimate_cost(1000) > 0.0);
    }

    #[test]
    fn create_with_rejects_missing_key() {
        let config = ClientConfig::new("openai", "gpt-4o");
        let err = ClientFactory::create_with(&config, &no_env(), Arc::new(Unreachable)).unwrap_err();
        assert!(matches!(err, LlmError::Configuration(_)));
    }

    #[test]
    fn supported_provider_queries() {
        assert!(ClientFactory::is_supported("openai"));
        assert!(ClientFactory::is_supported("LOCAL"));
        assert!(!ClientFactory::is_supported("cohere"));
        assert_eq!(ClientFactory::supported_providers().len(), 3);
    }
}
