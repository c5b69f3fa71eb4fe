/// Core provider trait and error types
///
/// Every model backend implements [`LlmProvider`]. Providers return raw model
/// text; JSON extraction and empty-response checks belong to
/// [`crate::client::LlmClient`], so each backend stays a thin transport.
///
/// # Example
///
/// ```no_run
/// use async_trait::async_trait;
/// use coldreach_llm::providers::{LlmProvider, LlmResult};
///
/// struct EchoProvider;
///
/// #[async_trait]
/// impl LlmProvider for EchoProvider {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     async fn call(&self, prompt: &str, _json_mode: bool) -> LlmResult<String> {
///         Ok(prompt.to_string())
///     }
/// }
/// ```

use async_trait::async_trait;

/// Boxed cause carried by [`LlmError::ProviderCallFailed`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// LLM error types
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The remote call failed; `source` holds the transport or API error
    #[error("{provider} call failed: {source}")]
    ProviderCallFailed {
        provider: String,
        #[source]
        source: BoxError,
    },

    /// The model answered with nothing usable
    #[error("Malformed LLM response: {0}")]
    ResponseMalformed(String),

    /// A required setting (usually an API key) is missing
    #[error("LLM provider not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    pub fn provider_call(provider: impl Into<String>, source: impl Into<BoxError>) -> Self {
        LlmError::ProviderCallFailed {
            provider: provider.into(),
            source: source.into(),
        }
    }

    /// Stable machine-readable code
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::ProviderCallFailed { .. } => "provider_call_failed",
            LlmError::ResponseMalformed(_) => "response_malformed",
            LlmError::NotConfigured(_) => "not_configured",
        }
    }
}

/// LLM result type alias
pub type LlmResult<T> = Result<T, LlmError>;

/// A text-generation backend
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name, used in errors and logs
    fn name(&self) -> &str;

    /// Sends one prompt and returns the model's text
    ///
    /// With `json_mode` the provider asks the model for a JSON object using
    /// whatever native switch it has.
    async fn call(&self, prompt: &str, json_mode: bool) -> LlmResult<String>;

    /// Like [`LlmProvider::call`], grounded with web search where supported
    ///
    /// Providers without search fall back to a plain call.
    async fn call_with_search(&self, prompt: &str, json_mode: bool) -> LlmResult<String> {
        self.call(prompt, json_mode).await
    }
}
