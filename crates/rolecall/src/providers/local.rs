//! Locally hosted OpenAI-compatible endpoint (Ollama, llama.cpp, vLLM).
//!
//! Request and response bodies are the OpenAI ones; only the URL and the
//! optional credential differ.

pub const LOCAL_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone)]
pub struct LocalAdapter {
    api_key: Option<String>,
    base_url: String,
}

impl LocalAdapter {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.unwrap_or_else(|| LOCAL_BASE_URL.to_string()),
        }
    }

    /// `{base}/v1/chat/completions`, unless the base already ends in `/v1`.
    pub fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }

    /// Bearer auth only when a key was configured.
    pub fn headers(&self) -> Vec<(String, String)> {
        self.api_key
            .iter()
            .map(|k| ("Authorization".to_string(), format!("Bearer {k}")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint() {
        let adapter = LocalAdapter::new(None, None);
        assert_eq!(adapter.endpoint(), "http://localhost:11434/v1/chat/completions");
        assert!(adapter.headers().is_empty());
    }

    #[test]
    fn base_url_with_version_suffix() {
        let adapter = LocalAdapter::new(None, Some("http://gpu-box:8000/v1/".into()));
        assert_eq!(adapter.endpoint(), "http://gpu-box:8000/v1/chat/completions");
    }

    #[test]
    fn key_adds_bearer_header() {
        let adapter = LocalAdapter::new(Some("secret".into()), None);
        assert_eq!(
            adapter.headers(),
            vec![("Authorization".to_string(), "Bearer secret".to_string())]
        );
        assert!(LocalAdapter::new(Some("  ".into()), None).headers().is_empty());
    }
}
