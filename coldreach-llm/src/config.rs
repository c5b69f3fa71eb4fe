/// LLM provider configuration
///
/// Read from the environment (and `.env`) through the `config` crate, like
/// the auth settings.
///
/// # Environment Variables
///
/// - `LLM_PROVIDER`: `gemini` (default) or `openai`
/// - `GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`
/// - `GEMINI_MODEL` (default: gemini-2.0-flash)
/// - `GEMINI_SEARCH_MODEL`: model for search-grounded calls (default: gemini-2.0-flash)
/// - `GEMINI_BASE_URL`
/// - `OPENAI_API_KEY`
/// - `OPENAI_MODEL` (default: gpt-4o)
/// - `OPENAI_BASE_URL` (default: https://api.openai.com/v1)
/// - `OPENAI_TEMPERATURE`: sent only when set
/// - `OPENAI_REASONING_EFFORT`: sent only when set
/// - `LLM_TIMEOUT_SECONDS`: HTTP timeout per call (default: 120)

use std::str::FromStr;
use std::time::Duration;

use config::{Config, ConfigError, Environment};

use crate::providers::gemini::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
use crate::providers::openai::{DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL};

const DEFAULT_TIMEOUT_SECONDS: u64 = 120;

/// Which backend [`crate::client::LlmClient::from_config`] builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    Gemini,
    OpenAi,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(ConfigError::Message(format!(
                "Unknown LLM_PROVIDER '{}', expected 'gemini' or 'openai'",
                other
            ))),
        }
    }
}

#[derive(Clone)]
pub struct LlmConfig {
    pub provider: ProviderKind,

    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_search_model: String,
    pub gemini_base_url: String,

    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub openai_temperature: Option<f64>,
    pub openai_reasoning_effort: Option<String>,

    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_search_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_temperature: None,
            openai_reasoning_effort: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let settings = Config::builder()
            .add_source(Environment::default())
            .build()?;

        Self::from_settings(&settings)
    }

    /// Reads configuration from an already-built settings tree
    ///
    /// Missing API keys are not an error here; the provider that needs one
    /// reports it when built.
    pub fn from_settings(settings: &Config) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let provider = match non_blank(settings, "llm_provider")? {
            Some(raw) => raw.parse()?,
            None => defaults.provider,
        };

        let gemini_api_key = match non_blank(settings, "gemini_api_key")? {
            Some(key) => Some(key),
            None => non_blank(settings, "google_api_key")?,
        };

        let openai_temperature = optional(settings.get_float("openai_temperature"))?;
        let timeout_seconds = match optional(settings.get_int("llm_timeout_seconds"))? {
            Some(secs) if secs > 0 => secs as u64,
            Some(_) => {
                return Err(ConfigError::Message(
                    "LLM_TIMEOUT_SECONDS must be positive".to_string(),
                ))
            }
            None => defaults.timeout_seconds,
        };

        Ok(Self {
            provider,
            gemini_api_key,
            gemini_model: non_blank(settings, "gemini_model")?.unwrap_or(defaults.gemini_model),
            gemini_search_model: non_blank(settings, "gemini_search_model")?
                .unwrap_or(defaults.gemini_search_model),
            gemini_base_url: non_blank(settings, "gemini_base_url")?
                .unwrap_or(defaults.gemini_base_url),
            openai_api_key: non_blank(settings, "openai_api_key")?,
            openai_model: non_blank(settings, "openai_model")?.unwrap_or(defaults.openai_model),
            openai_base_url: non_blank(settings, "openai_base_url")?
                .unwrap_or(defaults.openai_base_url),
            openai_temperature,
            openai_reasoning_effort: non_blank(settings, "openai_reasoning_effort")?,
            timeout_seconds,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "<redacted>"))
            .field("gemini_model", &self.gemini_model)
            .field("gemini_search_model", &self.gemini_search_model)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("openai_model", &self.openai_model)
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_temperature", &self.openai_temperature)
            .field("openai_reasoning_effort", &self.openai_reasoning_effort)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish_non_exhaustive()
    }
}

fn optional<T>(value: Result<T, ConfigError>) -> Result<Option<T>, ConfigError> {
    match value {
        Ok(v) => Ok(Some(v)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn non_blank(settings: &Config, key: &str) -> Result<Option<String>, ConfigError> {
    Ok(optional(settings.get_string(key))?
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty()))
}
