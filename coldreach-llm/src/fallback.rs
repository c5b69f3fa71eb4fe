/// Retry-and-learn fallback for rejected request parameters
///
/// When the API rejects a parameter by name, the parameter is removed, the
/// model is remembered as not supporting it, and the request is retried.
/// Later requests for the same model drop learned parameters up front.
///
/// ```text
/// attempt 1: {model, messages, temperature, response_format}  -> rejects temperature
/// attempt 2: {model, messages, response_format}               -> rejects response_format
/// attempt 3: {model, messages}                                -> ok
/// ```
///
/// Only rejections of a parameter present in the request are retried;
/// `model` and `messages` are never dropped. Every other error is returned
/// unchanged.

use std::collections::BTreeSet;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::providers::openai::{ChatApiError, ChatCompletion, ChatCompletionsApi, ChatRequest};

/// Upper bound on API calls for one request, the first one included
pub const MAX_ATTEMPTS: usize = 6;

const PROTECTED_PARAMS: [&str; 2] = ["model", "messages"];

/// Parameters each model has been seen to reject
///
/// Safe to share between tasks; insertion is atomic per model.
#[derive(Debug, Default)]
pub struct UnsupportedParamCache {
    learned: DashMap<String, BTreeSet<String>>,
}

impl UnsupportedParamCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `model` rejects `param`; true if this is new
    pub fn remember(&self, model: &str, param: &str) -> bool {
        self.learned
            .entry(model.to_string())
            .or_default()
            .insert(param.to_string())
    }

    /// Learned parameters for `model`, sorted
    pub fn learned(&self, model: &str) -> Vec<String> {
        self.learned
            .get(model)
            .map(|params| params.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.learned.is_empty()
    }

    pub fn clear(&self) {
        self.learned.clear();
    }
}

/// Sends `request`, dropping parameters the model rejects
///
/// # Errors
///
/// The last API error once it is not a droppable rejection, or once
/// [`MAX_ATTEMPTS`] calls have been made.
pub async fn create_with_fallback<A>(
    api: &A,
    cache: &UnsupportedParamCache,
    mut request: ChatRequest,
) -> Result<ChatCompletion, ChatApiError>
where
    A: ChatCompletionsApi + ?Sized,
{
    let model = request.model().to_string();

    for param in cache.learned(&model) {
        if request.remove(&param) {
            debug!(model = %model, param = %param, "Dropping learned unsupported parameter");
        }
    }

    let mut attempt = 1;
    loop {
        let err = match api.create(&request).await {
            Ok(completion) => return Ok(completion),
            Err(err) => err,
        };

        let Some(param) = err.unsupported_param() else {
            return Err(err);
        };

        let droppable = !PROTECTED_PARAMS.contains(&param.as_str()) && request.contains(&param);
        if !droppable || attempt >= MAX_ATTEMPTS {
            return Err(err);
        }

        request.remove(&param);
        if !model.is_empty() {
            cache.remember(&model, &param);
        }

        warn!(model = %model, param = %param, attempt, "Model rejected parameter, retrying without it");
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_cache_remember_and_learned() {
        let cache = UnsupportedParamCache::new();
        assert!(cache.is_empty());

        assert!(cache.remember("o1-mini", "temperature"));
        assert!(!cache.remember("o1-mini", "temperature"));
        assert!(cache.remember("o1-mini", "response_format"));

        assert_eq!(cache.learned("o1-mini"), vec!["response_format", "temperature"]);
        assert!(cache.learned("gpt-4o").is_empty());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_concurrent_inserts() {
        let cache = Arc::new(UnsupportedParamCache::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    cache.remember("gpt-4o", &format!("param_{}", i % 4));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.learned("gpt-4o").len(), 4);
    }
}
