//! Infrastructure Layer - External concerns and implementations
//!
//! This module holds the rate-limited dispatch path to the external
//! completion endpoint and the filter pipeline built on top of it.

pub mod filters;
pub mod model;

pub use filters::{FilterPipeline, FilterScope, VulnerabilityFilter};
pub use model::{
    CompletionClient, CompletionHandle, CompletionRequest, DescriptionValidator, ModelDispatcher,
    OpenAiCompletionClient, RequestorTier,
};
