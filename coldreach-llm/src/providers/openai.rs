/// OpenAI chat-completions provider
///
/// Requests are kept as a map of named parameters so that individual
/// parameters can be dropped by name. Before each call the provider removes
/// the parameters the static resolver ([`crate::compat`]) knows the model
/// rejects; [`crate::fallback::create_with_fallback`] then strips anything
/// learned at runtime and retries on further rejections.
///
/// OpenAI has no search grounding here, so `call_with_search` is a plain call.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::compat::strip_unsupported;
use crate::config::LlmConfig;
use crate::fallback::{create_with_fallback, UnsupportedParamCache};
use crate::providers::{LlmError, LlmProvider, LlmResult};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

const PROVIDER_NAME: &str = "openai";

/// One chat-completions request, as named parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    params: Map<String, Value>,
}

impl ChatRequest {
    /// Request for `model` with a single user message
    pub fn user(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        let mut params = Map::new();
        params.insert("model".to_string(), Value::String(model.into()));
        params.insert(
            "messages".to_string(),
            json!([{ "role": "user", "content": prompt.into() }]),
        );
        Self { params }
    }

    /// Sets a parameter, replacing any previous value
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn model(&self) -> &str {
        self.params
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn reasoning_effort(&self) -> Option<&str> {
        self.params.get("reasoning_effort").and_then(Value::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// Removes a parameter; false if it was not set
    pub fn remove(&mut self, name: &str) -> bool {
        self.params.remove(name).is_some()
    }

    /// The JSON body sent to the API
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }
}

/// The parts of a completion the provider uses
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub model: Option<String>,
}

impl ChatCompletion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            model: None,
        }
    }
}

/// Chat API error types
#[derive(Debug, thiserror::Error)]
pub enum ChatApiError {
    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error status
    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        code: Option<String>,
        param: Option<String>,
    },

    /// The API answered 2xx with a body we could not read
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    code: Option<String>,
    param: Option<String>,
}

impl ChatApiError {
    /// Builds an `Api` error from a response status and body
    ///
    /// Bodies in the usual `{"error": {...}}` shape keep their code and param;
    /// anything else is carried verbatim as the message.
    pub fn from_error_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => ChatApiError::Api {
                status,
                message: envelope.error.message,
                code: envelope.error.code,
                param: envelope.error.param,
            },
            Err(_) => ChatApiError::Api {
                status,
                message: body.to_string(),
                code: None,
                param: None,
            },
        }
    }

    /// The request parameter this error rejects, if it is that kind of error
    ///
    /// Prefers the structured `code`/`param` pair and falls back to the
    /// message text. Nested names such as `response_format.type` resolve to
    /// their top-level parameter.
    pub fn unsupported_param(&self) -> Option<String> {
        static MESSAGE_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

        let ChatApiError::Api {
            message,
            code,
            param,
            ..
        } = self
        else {
            return None;
        };

        let structured = matches!(
            code.as_deref(),
            Some("unsupported_value") | Some("unsupported_parameter")
        );
        if let (true, Some(param)) = (structured, param.as_deref()) {
            return Some(top_level(param));
        }

        let pattern = MESSAGE_PATTERN
            .get_or_init(|| Regex::new(r"Unsupported (?:value|parameter): '([^']+)'").ok())
            .as_ref()?;
        pattern
            .captures(message)
            .and_then(|captures| captures.get(1))
            .map(|m| top_level(m.as_str()))
    }
}

fn top_level(param: &str) -> String {
    param.split('.').next().unwrap_or(param).to_string()
}

/// The one chat-completions operation the provider needs
///
/// Implemented over HTTP by [`HttpChatApi`]; tests substitute scripted fakes.
#[async_trait]
pub trait ChatCompletionsApi: Send + Sync {
    async fn create(&self, request: &ChatRequest) -> Result<ChatCompletion, ChatApiError>;
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Chat completions over HTTPS
pub struct HttpChatApi {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpChatApi {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl ChatCompletionsApi for HttpChatApi {
    async fn create(&self, request: &ChatRequest) -> Result<ChatCompletion, ChatApiError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request.params())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ChatApiError::from_error_body(status.as_u16(), &body));
        }

        let parsed: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| ChatApiError::InvalidResponse(e.to_string()))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                model = request.model(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion succeeded"
            );
        }

        Ok(ChatCompletion {
            content: parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content),
            model: parsed.model,
        })
    }
}

/// Request settings applied to every call
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub model: String,
    pub temperature: Option<f64>,
    pub reasoning_effort: Option<String>,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_OPENAI_MODEL.to_string(),
            temperature: None,
            reasoning_effort: None,
        }
    }
}

pub struct OpenAiProvider {
    api: Arc<dyn ChatCompletionsApi>,
    settings: OpenAiSettings,
    cache: Arc<UnsupportedParamCache>,
}

impl OpenAiProvider {
    pub fn new(
        api: Arc<dyn ChatCompletionsApi>,
        settings: OpenAiSettings,
        cache: Arc<UnsupportedParamCache>,
    ) -> Self {
        Self {
            api,
            settings,
            cache,
        }
    }

    /// HTTP-backed provider from configuration
    ///
    /// # Errors
    ///
    /// `NotConfigured` if no OpenAI API key is set.
    pub fn from_config(config: &LlmConfig) -> LlmResult<Self> {
        let api_key = config
            .openai_api_key
            .clone()
            .ok_or_else(|| LlmError::NotConfigured("OPENAI_API_KEY is not set".to_string()))?;

        let api = HttpChatApi::new(api_key, &config.openai_base_url, config.request_timeout());

        Ok(Self::new(
            Arc::new(api),
            OpenAiSettings {
                model: config.openai_model.clone(),
                temperature: config.openai_temperature,
                reasoning_effort: config.openai_reasoning_effort.clone(),
            },
            Arc::new(UnsupportedParamCache::new()),
        ))
    }

    /// Parameters learned to be unsupported, shared with anyone holding the Arc
    pub fn cache(&self) -> &Arc<UnsupportedParamCache> {
        &self.cache
    }

    pub fn settings(&self) -> &OpenAiSettings {
        &self.settings
    }

    /// The request for one prompt, after static compatibility stripping
    pub fn build_request(&self, prompt: &str, json_mode: bool) -> ChatRequest {
        let mut request = ChatRequest::user(&self.settings.model, prompt);

        if let Some(temperature) = self.settings.temperature {
            request = request.with("temperature", temperature);
        }
        if let Some(effort) = &self.settings.reasoning_effort {
            request = request.with("reasoning_effort", effort.as_str());
        }
        if json_mode {
            request = request.with("response_format", json!({ "type": "json_object" }));
        }

        let stripped = strip_unsupported(&mut request);
        if !stripped.is_empty() {
            debug!(
                model = %self.settings.model,
                params = ?stripped,
                "Omitting parameters the model does not accept"
            );
        }

        request
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn call(&self, prompt: &str, json_mode: bool) -> LlmResult<String> {
        let request = self.build_request(prompt, json_mode);

        let completion = create_with_fallback(self.api.as_ref(), &self.cache, request)
            .await
            .map_err(|e| LlmError::provider_call(PROVIDER_NAME, e))?;

        Ok(completion.content.unwrap_or_default())
    }
}
