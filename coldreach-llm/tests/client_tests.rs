/// Integration tests for the LLM client facade, using the mock provider

use std::sync::Arc;

use coldreach_llm::providers::MockProvider;
use coldreach_llm::{LlmClient, LlmError};
use serde::Deserialize;

fn client_with(provider: &Arc<MockProvider>) -> LlmClient {
    LlmClient::new(provider.clone())
}

#[tokio::test]
async fn test_json_mode_extracts_json_from_prose() {
    let provider = Arc::new(MockProvider::new(""));
    provider.push_text("{\"subject\": \"Quick question\"}");
    provider.push_text("Here is the draft:\n```json\n{\"subject\": \"Hi\", \"body\": \"...\"}\n```");
    provider.push_text("Sure. {\"subject\": \"Intro\", \"meta\": {\"tone\": \"warm\"}} Let me know!");
    let client = client_with(&provider);

    assert_eq!(
        client.call("draft", true).await.unwrap(),
        "{\"subject\": \"Quick question\"}"
    );
    assert_eq!(
        client.call("draft", true).await.unwrap(),
        "{\"subject\": \"Hi\", \"body\": \"...\"}"
    );
    assert_eq!(
        client.call("draft", true).await.unwrap(),
        "{\"subject\": \"Intro\", \"meta\": {\"tone\": \"warm\"}}"
    );

    assert!(provider.calls().iter().all(|call| call.json_mode && !call.search));
}

#[tokio::test]
async fn test_json_mode_without_json_is_malformed() {
    let provider = Arc::new(MockProvider::new("I cannot help with that."));
    let client = client_with(&provider);

    let err = client.call("draft", true).await.unwrap_err();
    assert!(matches!(err, LlmError::ResponseMalformed(_)));
    assert_eq!(err.kind(), "response_malformed");

    // The same text is fine outside JSON mode
    assert_eq!(client.call("draft", false).await.unwrap(), "I cannot help with that.");
}

#[tokio::test]
async fn test_empty_response_is_malformed_in_both_modes() {
    let provider = Arc::new(MockProvider::new(""));
    let client = client_with(&provider);

    assert!(matches!(client.call("x", false).await, Err(LlmError::ResponseMalformed(_))));
    assert!(matches!(client.call("x", true).await, Err(LlmError::ResponseMalformed(_))));
    assert!(matches!(
        client.call_with_search("x", false).await,
        Err(LlmError::ResponseMalformed(_))
    ));
}

#[tokio::test]
async fn test_search_calls_reach_provider_search() {
    let provider = Arc::new(MockProvider::new("```\n{\"company\": \"Acme\"}\n```"));
    let client = client_with(&provider);

    let text = client.call_with_search("Who is Acme?", true).await.unwrap();
    assert_eq!(text, "{\"company\": \"Acme\"}");

    let calls = provider.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].search);
    assert_eq!(calls[0].prompt, "Who is Acme?");
}

#[tokio::test]
async fn test_provider_failure_passes_through() {
    let provider = Arc::new(MockProvider::new("{}"));
    provider.push_failure("quota exceeded");
    let client = client_with(&provider);

    let err = client.call("x", true).await.unwrap_err();
    match err {
        LlmError::ProviderCallFailed { provider, source } => {
            assert_eq!(provider, "mock");
            assert_eq!(source.to_string(), "quota exceeded");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert_eq!(client.call("x", true).await.unwrap(), "{}");
}

#[derive(Debug, Deserialize, PartialEq)]
struct Draft {
    subject: String,
    body: String,
}

#[tokio::test]
async fn test_call_json_deserializes() {
    let provider = Arc::new(MockProvider::new(""));
    provider.push_text("```json\n{\"subject\": \"Hello\", \"body\": \"Short note\"}\n```");
    provider.push_text("{\"subject\": \"Missing body\"}");
    let client = client_with(&provider);

    let draft: Draft = client.call_json("draft").await.unwrap();
    assert_eq!(
        draft,
        Draft {
            subject: "Hello".to_string(),
            body: "Short note".to_string(),
        }
    );

    let err = client.call_json::<Draft>("draft").await.unwrap_err();
    assert!(matches!(err, LlmError::ResponseMalformed(_)));
}
