//! # Coldreach LLM Library
//!
//! Provider-neutral LLM calls for drafting outreach emails.
//!
//! ## Modules
//!
//! - `client`: `LlmClient`, the handle call sites use
//! - `providers`: Gemini, OpenAI and mock backends
//! - `compat`: parameters each OpenAI model family rejects
//! - `fallback`: retry that drops parameters the API reports as unsupported
//! - `json`: extraction of JSON from model output
//! - `config`: provider settings from the environment
//!
//! ## Example
//!
//! ```no_run
//! use coldreach_llm::client::LlmClient;
//! use coldreach_llm::config::LlmConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = LlmClient::from_config(&LlmConfig::from_env()?)?;
//! let draft = client.call("Write a two-line intro email", false).await?;
//! println!("{}", draft);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod compat;
pub mod config;
pub mod fallback;
pub mod json;
pub mod providers;

pub use client::LlmClient;
pub use providers::{LlmError, LlmProvider, LlmResult};
