/// Model backends
///
/// # Providers
///
/// - **Gemini**: default; search calls use Google Search grounding
/// - **OpenAI**: chat completions with parameter compatibility handling
/// - **Mock**: scripted replies for tests
///
/// All of them implement [`LlmProvider`] and are used through
/// [`crate::client::LlmClient`].

pub mod gemini;
pub mod mock;
pub mod openai;
pub mod provider_trait;

pub use gemini::GeminiProvider;
pub use mock::{MockCall, MockProvider};
pub use openai::{
    ChatApiError, ChatCompletion, ChatCompletionsApi, ChatRequest, HttpChatApi, OpenAiProvider,
    OpenAiSettings,
};
pub use provider_trait::{BoxError, LlmError, LlmProvider, LlmResult};
