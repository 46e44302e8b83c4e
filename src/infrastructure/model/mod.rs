//! Completion-endpoint plumbing: wire types, request costing, rate-limited
//! dispatch, and the description-validation adapter

pub mod chat;
pub mod dispatcher;
pub mod rate_limit;
pub mod validator;

pub use chat::{ChatMessage, CompletionClient, CompletionRequest, OpenAiCompletionClient, TokenCoster};
pub use dispatcher::{CompletionHandle, DispatcherStats, ModelDispatcher, RequestorTier};
pub use rate_limit::TokenBucket;
pub use validator::DescriptionValidator;
