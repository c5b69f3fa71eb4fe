/// Scripted provider for tests and offline runs
///
/// Replies are served from a queue in order; once the queue is empty every
/// call gets the default reply. Each call is recorded so tests can assert on
/// what was sent.
///
/// # Example
///
/// ```
/// use coldreach_llm::providers::{LlmProvider, MockProvider};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = MockProvider::new("{}");
/// provider.push_text("{\"subject\": \"Hello\"}");
///
/// assert_eq!(provider.call("draft", true).await?, "{\"subject\": \"Hello\"}");
/// assert_eq!(provider.call("draft", true).await?, "{}");
/// assert_eq!(provider.calls().len(), 2);
/// # Ok(())
/// # }
/// ```

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::providers::{LlmError, LlmProvider, LlmResult};

const PROVIDER_NAME: &str = "mock";

#[derive(Debug, Clone)]
enum MockReply {
    Text(String),
    Failure(String),
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub prompt: String,
    pub json_mode: bool,
    pub search: bool,
}

pub struct MockProvider {
    default_reply: String,
    replies: Mutex<VecDeque<MockReply>>,
    calls: Mutex<Vec<MockCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProvider {
    pub fn new(default_reply: impl Into<String>) -> Self {
        Self {
            default_reply: default_reply.into(),
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues a successful reply
    pub fn push_text(&self, text: impl Into<String>) {
        lock(&self.replies).push_back(MockReply::Text(text.into()));
    }

    /// Queues a failed call
    pub fn push_failure(&self, message: impl Into<String>) {
        lock(&self.replies).push_back(MockReply::Failure(message.into()));
    }

    /// Calls made so far, oldest first
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    fn reply(&self, prompt: &str, json_mode: bool, search: bool) -> LlmResult<String> {
        lock(&self.calls).push(MockCall {
            prompt: prompt.to_string(),
            json_mode,
            search,
        });

        match lock(&self.replies).pop_front() {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Failure(message)) => Err(LlmError::provider_call(PROVIDER_NAME, message)),
            None => Ok(self.default_reply.clone()),
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("")
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn call(&self, prompt: &str, json_mode: bool) -> LlmResult<String> {
        self.reply(prompt, json_mode, false)
    }

    async fn call_with_search(&self, prompt: &str, json_mode: bool) -> LlmResult<String> {
        self.reply(prompt, json_mode, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_in_order_then_default() {
        let provider = MockProvider::new("default");
        provider.push_text("first");
        provider.push_failure("rate limited");

        assert_eq!(provider.call("a", false).await.unwrap(), "first");
        assert!(matches!(
            provider.call("b", false).await,
            Err(LlmError::ProviderCallFailed { .. })
        ));
        assert_eq!(provider.call_with_search("c", true).await.unwrap(), "default");

        let calls = provider.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[2],
            MockCall {
                prompt: "c".to_string(),
                json_mode: true,
                search: true,
            }
        );
    }
}
