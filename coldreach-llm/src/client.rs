/// LLM call facade
///
/// [`LlmClient`] is the handle call sites hold. It wraps one provider and adds
/// the guarantees callers rely on: an empty reply is an error, and a JSON-mode
/// reply is always text that parses as JSON.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use coldreach_llm::client::LlmClient;
/// use coldreach_llm::providers::MockProvider;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = Arc::new(MockProvider::new("Sure! ```json\n{\"subject\": \"Hi\"}\n```"));
/// let client = LlmClient::new(provider);
///
/// let json = client.call("Write a subject line as JSON", true).await?;
/// assert_eq!(json, "{\"subject\": \"Hi\"}");
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::{LlmConfig, ProviderKind};
use crate::json::ensure_strict_json;
use crate::providers::{GeminiProvider, LlmError, LlmProvider, LlmResult, OpenAiProvider};

#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Builds the configured backend
    ///
    /// # Errors
    ///
    /// `NotConfigured` if the selected provider has no API key.
    pub fn from_config(config: &LlmConfig) -> LlmResult<Self> {
        let provider: Arc<dyn LlmProvider> = match config.provider {
            ProviderKind::Gemini => Arc::new(GeminiProvider::from_config(config)?),
            ProviderKind::OpenAi => Arc::new(OpenAiProvider::from_config(config)?),
        };

        debug!(provider = provider.name(), "LLM client ready");
        Ok(Self::new(provider))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn call(&self, prompt: &str, json_mode: bool) -> LlmResult<String> {
        let text = self.provider.call(prompt, json_mode).await?;
        self.finish(text, json_mode)
    }

    /// Call with web search grounding where the provider supports it
    pub async fn call_with_search(&self, prompt: &str, json_mode: bool) -> LlmResult<String> {
        let text = self.provider.call_with_search(prompt, json_mode).await?;
        self.finish(text, json_mode)
    }

    /// JSON-mode call deserialized into `T`
    ///
    /// # Errors
    ///
    /// `ResponseMalformed` if the JSON does not match `T`.
    pub async fn call_json<T: DeserializeOwned>(&self, prompt: &str) -> LlmResult<T> {
        let text = self.call(prompt, true).await?;

        serde_json::from_str(&text).map_err(|e| {
            LlmError::ResponseMalformed(format!("unexpected JSON shape: {}", e))
        })
    }

    fn finish(&self, text: String, json_mode: bool) -> LlmResult<String> {
        if text.trim().is_empty() {
            warn!(provider = self.provider.name(), "Provider returned an empty response");
            return Err(LlmError::ResponseMalformed("empty response".to_string()));
        }

        if json_mode {
            return ensure_strict_json(&text).map_err(|e| {
                warn!(provider = self.provider.name(), "Provider response is not JSON");
                e
            });
        }

        Ok(text)
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.provider.name())
            .finish()
    }
}
