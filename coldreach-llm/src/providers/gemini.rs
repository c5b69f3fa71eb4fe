/// Google Gemini provider
///
/// Calls the `generateContent` REST endpoint. JSON mode sets
/// `responseMimeType: application/json`; search calls go to the configured
/// search model with the Google Search tool enabled.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::LlmConfig;
use crate::providers::{LlmError, LlmProvider, LlmResult};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

const PROVIDER_NAME: &str = "gemini";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

/// Request body for one prompt
pub fn request_body(prompt: &str, json_mode: bool, search: bool) -> Value {
    let mut body = json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }]
        }]
    });

    if json_mode {
        body["generationConfig"] = json!({ "responseMimeType": "application/json" });
    }
    if search {
        body["tools"] = json!([{ "google_search": {} }]);
    }

    body
}

/// Concatenated text parts of the first candidate
fn response_text(response: GenerateContentResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default()
}

pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    search_model: String,
}

impl GeminiProvider {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        search_model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            search_model: search_model.into(),
        }
    }

    /// # Errors
    ///
    /// `NotConfigured` if neither `GEMINI_API_KEY` nor `GOOGLE_API_KEY` is set.
    pub fn from_config(config: &LlmConfig) -> LlmResult<Self> {
        let api_key = config.gemini_api_key.clone().ok_or_else(|| {
            LlmError::NotConfigured("GEMINI_API_KEY or GOOGLE_API_KEY is not set".to_string())
        })?;

        Ok(Self::new(
            api_key,
            &config.gemini_model,
            &config.gemini_search_model,
            &config.gemini_base_url,
            config.request_timeout(),
        ))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn search_model(&self) -> &str {
        &self.search_model
    }

    async fn generate(&self, model: &str, prompt: &str, json_mode: bool, search: bool) -> LlmResult<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(prompt, json_mode, search))
            .send()
            .await
            .map_err(|e| LlmError::provider_call(PROVIDER_NAME, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::provider_call(PROVIDER_NAME, e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);
            return Err(LlmError::provider_call(
                PROVIDER_NAME,
                format!("API error (status {}): {}", status.as_u16(), message),
            ));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::provider_call(PROVIDER_NAME, e))?;

        debug!(model, search, "Gemini call succeeded");
        Ok(response_text(parsed))
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn call(&self, prompt: &str, json_mode: bool) -> LlmResult<String> {
        self.generate(&self.model, prompt, json_mode, false).await
    }

    async fn call_with_search(&self, prompt: &str, json_mode: bool) -> LlmResult<String> {
        self.generate(&self.search_model, prompt, json_mode, true).await
    }
}
