//! Description-validation adapter over the dispatcher
//!
//! Wraps a fixed validation prompt around a free-text description and maps
//! the model's constrained single-character verdict to a boolean.

use std::sync::Arc;

use crate::application::errors::ValidatorError;

use super::chat::{ChatMessage, CompletionRequest};
use super::dispatcher::{ModelDispatcher, RequestorTier};

const VALIDATION_PROMPT: &str = "You audit vulnerability descriptions. \
Reply with exactly one character and nothing else: \
0 if the text plausibly describes a single software vulnerability, \
1 if it does not.";

const VALID_REPLY: &str = "0";
const INVALID_REPLY: &str = "1";

/// Classifies descriptions through the shared dispatcher
pub struct DescriptionValidator {
    dispatcher: Arc<ModelDispatcher>,
}

impl DescriptionValidator {
    pub fn new(dispatcher: Arc<ModelDispatcher>) -> Self {
        Self { dispatcher }
    }

    fn request_for(&self, description: &str) -> CompletionRequest {
        CompletionRequest {
            messages: vec![
                ChatMessage::system(VALIDATION_PROMPT),
                ChatMessage::user(description),
            ],
            max_reply_tokens: 1,
        }
    }

    /// Token cost of validating `description`, computed locally without
    /// queueing anything
    pub fn token_count(&self, description: &str) -> usize {
        self.dispatcher.token_cost(&self.request_for(description))
    }

    /// Whether a validation request for `description` fits the model's
    /// context window
    pub fn fits_context(&self, description: &str) -> bool {
        self.token_count(description) <= self.dispatcher.context_window()
    }

    /// Ask the model whether `description` is a valid vulnerability
    /// description.
    ///
    /// Blocks on the dispatcher's completion handle; that wait is isolated
    /// to whichever task calls this. Replies other than the two recognized
    /// verdicts raise [`ValidatorError::InvalidReply`].
    pub async fn classify(&self, description: &str) -> Result<bool, ValidatorError> {
        let handle = self
            .dispatcher
            .submit(self.request_for(description), RequestorTier::Filter)?;

        let reply = handle.wait().await?;
        match reply.as_str() {
            VALID_REPLY => Ok(true),
            INVALID_REPLY => Ok(false),
            _ => Err(ValidatorError::InvalidReply(reply)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::ModelError;
    use crate::config::ModelConfig;
    use crate::infrastructure::model::chat::CompletionClient;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ReplySequenceClient {
        replies: Mutex<VecDeque<String>>,
    }

    impl ReplySequenceClient {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for ReplySequenceClient {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, ModelError> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(ModelError::MissingChoice)
        }

        async fn list_models(&self) -> Result<Vec<String>, ModelError> {
            Ok(Vec::new())
        }
    }

    fn validator_with(replies: &[&str]) -> DescriptionValidator {
        let config = ModelConfig {
            base_url: "http://unused.invalid".to_string(),
            api_key: None,
            model: "test-model".to_string(),
            temperature: 0.0,
            max_reply_tokens: 1,
            context_window_tokens: 4096,
            requests_per_minute: 100_000,
            tokens_per_minute: 1_000_000,
            timeout_seconds: 5,
            workers: 1,
        };
        let client = ReplySequenceClient::new(replies);
        let dispatcher =
            Arc::new(ModelDispatcher::new(&config, client as Arc<dyn CompletionClient>).unwrap());
        DescriptionValidator::new(dispatcher)
    }

    #[tokio::test(start_paused = true)]
    async fn classify_maps_the_two_recognized_verdicts() {
        let validator = validator_with(&["0", "1"]);
        assert!(validator.classify("a plausible description").await.unwrap());
        assert!(!validator.classify("garbage text").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn classify_raises_invalid_reply_for_anything_else() {
        let validator = validator_with(&["maybe", "01", "0 "]);
        for _ in 0..3 {
            match validator.classify("ambiguous").await {
                Err(ValidatorError::InvalidReply(_)) => {}
                other => panic!("expected InvalidReply, got {:?}", other),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn token_count_reflects_the_wrapped_prompt() {
        let validator = validator_with(&[]);
        let bare = validator.token_count("short text");
        let longer = validator.token_count("short text that keeps going with more words");
        assert!(longer > bare);
        assert!(validator.fits_context("short text"));
    }
}
