//! Chat-completion wire types, client, and request costing

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tiktoken_rs::CoreBPE;

use crate::application::errors::ModelError;
use crate::config::ModelConfig;

/// One role/content message of a completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A completion request as submitted to the dispatcher. Model id and
/// temperature are fixed per client, so only the conversation and the
/// reply budget vary per request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_reply_tokens: u32,
}

/// Client for a chat-style completion endpoint
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Perform the network call and return the first reply choice
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError>;

    /// Zero-cost probe listing available models; validates connectivity
    /// and credentials without consuming completion quota
    async fn list_models(&self) -> Result<Vec<String>, ModelError>;
}

/// Request payload for the chat completions endpoint
#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
    max_tokens: u32,
}

/// Response from the chat completions endpoint
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ModelListResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Client for an OpenAI-style chat completion API
pub struct OpenAiCompletionClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAiCompletionClient {
    pub fn new(config: &ModelConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("vulnintel/0.1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError> {
        let body = ChatCompletionBody {
            model: &self.model,
            temperature: self.temperature,
            messages: &request.messages,
            max_tokens: request.max_reply_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self.authorized(self.client.post(&url)).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Http { status, message });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(ModelError::MissingChoice)
    }

    async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        let url = format!("{}/models", self.base_url);
        let response = self.authorized(self.client.get(&url)).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Http { status, message });
        }

        let listing: ModelListResponse = response.json().await?;
        Ok(listing.data.into_iter().map(|entry| entry.id).collect())
    }
}

/// Pure token costing for completion requests.
///
/// Costs are computed locally, never by calling out: the same number feeds
/// both limiter acquisition and pre-queue admission control.
pub struct TokenCoster {
    bpe: CoreBPE,
}

impl TokenCoster {
    /// Fixed per-message framing overhead on top of the content tokens
    const TOKENS_PER_MESSAGE: usize = 4;
    /// Tokens priming the assistant reply
    const REPLY_PRIMING_TOKENS: usize = 3;

    pub fn new() -> Result<Self, ModelError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|error| ModelError::Tokenizer {
            message: error.to_string(),
        })?;
        Ok(Self { bpe })
    }

    /// Token cost of a request: encoded content plus per-message overhead
    /// plus reply priming
    pub fn cost(&self, request: &CompletionRequest) -> usize {
        let content_tokens: usize = request
            .messages
            .iter()
            .map(|message| {
                self.bpe.encode_with_special_tokens(&message.content).len()
                    + Self::TOKENS_PER_MESSAGE
            })
            .sum();
        content_tokens + Self::REPLY_PRIMING_TOKENS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config(base_url: String) -> ModelConfig {
        ModelConfig {
            base_url,
            api_key: Some("test-key".to_string()),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.0,
            max_reply_tokens: 1,
            context_window_tokens: 4096,
            requests_per_minute: 3500,
            tokens_per_minute: 90000,
            timeout_seconds: 5,
            workers: 2,
        }
    }

    fn request(content: &str) -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::system("validator"), ChatMessage::user(content)],
            max_reply_tokens: 1,
        }
    }

    #[tokio::test]
    async fn complete_returns_first_choice_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [
                        {"message": {"role": "assistant", "content": "0"}},
                        {"message": {"role": "assistant", "content": "1"}}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = OpenAiCompletionClient::new(&test_config(server.url()));
        let reply = client.complete(&request("some description")).await.unwrap();
        assert_eq!(reply, "0");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn complete_maps_http_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let client = OpenAiCompletionClient::new(&test_config(server.url()));
        match client.complete(&request("some description")).await {
            Err(ModelError::Http { status, message }) => {
                assert_eq!(status, 429);
                assert_eq!(message, "rate limited");
            }
            other => panic!("expected Http error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn complete_rejects_empty_choice_list() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"choices": []}).to_string())
            .create_async()
            .await;

        let client = OpenAiCompletionClient::new(&test_config(server.url()));
        assert!(matches!(
            client.complete(&request("some description")).await,
            Err(ModelError::MissingChoice)
        ));
    }

    #[tokio::test]
    async fn list_models_parses_ids() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/models")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"data": [{"id": "gpt-3.5-turbo"}, {"id": "gpt-4"}]}).to_string(),
            )
            .create_async()
            .await;

        let client = OpenAiCompletionClient::new(&test_config(server.url()));
        let models = client.list_models().await.unwrap();
        assert_eq!(models, vec!["gpt-3.5-turbo", "gpt-4"]);
    }

    #[test]
    fn cost_grows_with_content_and_never_undercounts_overhead() {
        let coster = TokenCoster::new().unwrap();
        let short = coster.cost(&request("tiny"));
        let long = coster.cost(&request(
            "a considerably longer vulnerability description with many more words in it",
        ));
        assert!(long > short);
        // Two messages of framing plus reply priming is the floor.
        assert!(short > TokenCoster::TOKENS_PER_MESSAGE * 2);
    }
}
