//! Application layer error types

use crate::domain::DomainError;
use thiserror::Error;

/// Application-level errors
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Model dispatch error: {0}")]
    Model(#[from] ModelError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while dispatching requests to the completion endpoint
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Request of {cost} tokens exceeds the {limit}-token context window")]
    OversizedRequest { cost: usize, limit: usize },

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Completion reply contained no choices")]
    MissingChoice,

    #[error("Request was abandoned before dispatch")]
    Abandoned,

    #[error("Dispatcher is shutting down and no longer accepts requests")]
    ShuttingDown,

    #[error("Tokenizer initialization failed: {message}")]
    Tokenizer { message: String },
}

/// Errors raised by the description-validation adapter
#[derive(Error, Debug)]
pub enum ValidatorError {
    /// The model replied with something other than the two recognized
    /// single-character verdicts.
    #[error("Unrecognized validation reply: {0:?}")]
    InvalidReply(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}
