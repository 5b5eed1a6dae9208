//! The provider-neutral [`LlmClient`].
//!
//! A client is one configured provider/model pair. [`chat`](LlmClient::chat)
//! validates the request, sends it through the retry policy, and normalizes
//! the reply. [`chat_stream`](LlmClient::chat_stream) makes exactly one
//! attempt and hands back a lazy [`TextStream`].
//!
//! Sampling values resolve as request → config → crate default. `top_p` is
//! only read from the config.

use crate::api::pricing::PricingInfo;
use crate::api::retry::RetryPolicy;
use crate::api::streaming::TextStream;
use crate::api::transport::{HttpRequest, Transport};
use crate::config::ClientConfig;
use crate::error::{LlmError, Result};
use crate::providers::{GenerationOptions, Provider, ProviderAdapter};
use crate::{ChatRequest, ChatResponse};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::{debug, trace};

/// Generate a correlation ID for one client call.
fn next_request_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("req-{ts:x}-{count:04x}")
}

/// Client for one provider/model pair.
pub struct LlmClient {
    config: ClientConfig,
    adapter: ProviderAdapter,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl LlmClient {
    /// Assemble a client from an already validated config.
    ///
    /// Use [`ClientFactory`](crate::factory::ClientFactory) instead; it
    /// validates the config and resolves the API key.
    pub(crate) fn new(
        config: ClientConfig,
        provider: Provider,
        api_key: Option<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let adapter = ProviderAdapter::new(provider, api_key, config.base_url.clone());
        Self {
            config,
            adapter,
            transport,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the default retry policy (3 attempts, 1s base delay).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> Provider {
        self.adapter.provider()
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Price per 1K tokens for the configured model.
    pub fn pricing(&self) -> PricingInfo {
        self.adapter.pricing(&self.config.model)
    }

    /// Rough cost of `tokens` tokens at the mean of input and output rates.
    pub fn estimate_cost(&self, tokens: u32) -> f64 {
        self.pricing().estimate(tokens)
    }

    /// Exact cost of a call with the given token counts.
    pub fn calculate_cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        self.pricing().cost(prompt_tokens, completion_tokens)
    }

    fn options(&self, request: &ChatRequest, stream: bool) -> GenerationOptions {
        GenerationOptions {
            model: self.config.model.clone(),
            temperature: request
                .temperature
                .unwrap_or_else(|| self.config.effective_temperature()),
            max_tokens: request
                .max_tokens
                .unwrap_or_else(|| self.config.effective_max_tokens()),
            top_p: self.config.top_p,
            stream,
        }
    }

    /// Send a chat request, retrying transient failures.
    ///
    /// Returns [`LlmError::Validation`] without touching the network when the
    /// request is malformed. Every other failure is wrapped in
    /// [`LlmError::Request`] naming the model.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        request.validate()?;

        let request_id = next_request_id();
        let options = self.options(request, false);
        let http = self.adapter.http_request(request, &options);
        debug!(
            "[{request_id}] {} request: model={}, messages={}, tools={}, temperature={}, max_tokens={}",
            self.provider(),
            options.model,
            request.messages.len(),
            request.tools().len(),
            options.temperature,
            options.max_tokens
        );

        let response = self
            .retry
            .run(|| self.attempt(&http, &request_id))
            .await
            .map_err(|e| {
                debug!("[{request_id}] {} request failed: {e}", self.provider());
                LlmError::request(&self.config.model, e)
            })?;

        debug!(
            "[{request_id}] {} response: finish={}, tokens={} prompt + {} completion",
            self.provider(),
            response.finish_reason,
            response.usage.prompt_tokens,
            response.usage.completion_tokens
        );
        Ok(response)
    }

    /// One network attempt. Non-2xx replies become [`LlmError::Api`].
    async fn attempt(&self, http: &HttpRequest, request_id: &str) -> Result<ChatResponse> {
        let reply = self.transport.send(http.clone()).await?;
        trace!(
            "[{request_id}] HTTP {} with {} byte body",
            reply.status,
            reply.body.len()
        );
        if !reply.is_success() {
            return Err(LlmError::Api {
                provider: self.provider().to_string(),
                status: reply.status,
                body: reply.body,
            });
        }
        self.adapter.parse_response(&reply.body)
    }

    /// Start a streaming chat request.
    ///
    /// Makes exactly one attempt, never retried. Only text deltas are
    /// surfaced; tool calls require [`chat`](Self::chat).
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<TextStream> {
        request.validate()?;

        let request_id = next_request_id();
        let options = self.options(request, true);
        let http = self.adapter.http_request(request, &options);
        debug!(
            "[{request_id}] {} stream request: model={}, messages={}",
            self.provider(),
            options.model,
            request.messages.len()
        );

        let reply = self
            .transport
            .send_streaming(http)
            .await
            .map_err(|e| LlmError::request(&self.config.model, LlmError::Transport(e)))?;

        if !reply.is_success() {
            let status = reply.status;
            let body = reply.text().await;
            debug!("[{request_id}] {} stream rejected with HTTP {status}", self.provider());
            return Err(LlmError::request(
                &self.config.model,
                LlmError::Api {
                    provider: self.provider().to_string(),
                    status,
                    body,
                },
            ));
        }

        Ok(TextStream::from_sse(
            reply.body,
            self.adapter.stream_decoder(),
            self.provider().as_str(),
            self.config.model.clone(),
        ))
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.provider())
            .field("model", &self.config.model)
            .field("endpoint", &self.adapter.endpoint())
            .field("retry", &self.retry)
            .finish()
    }
}
