//! Configuration management

use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub filter: FilterConfig,
    pub reconciler: ReconcilerConfig,
    pub logging: LoggingConfig,
}

/// Completion endpoint and dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_reply_tokens: u32,
    /// Largest request (in tokens) accepted for dispatch; larger requests
    /// are rejected locally before they reach the queue.
    pub context_window_tokens: usize,
    /// Request budget per minute. Provider-tier specific, so configurable
    /// rather than baked in.
    pub requests_per_minute: u32,
    /// Token budget per minute. Provider-tier specific.
    pub tokens_per_minute: u32,
    pub timeout_seconds: u64,
    /// Fixed size of the worker pool performing network calls.
    pub workers: usize,
}

/// Filter pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Which filters to run: "all", "local", or "remote".
    pub scope: String,
    /// Keep records owned by different CVE identifiers in separate
    /// equivalence classes even when their descriptions match.
    pub separate_identifiers: bool,
    pub min_description_chars: usize,
    pub max_description_chars: usize,
    /// Wall-clock budget granted to a parallel filter batch, per record.
    pub per_record_budget_seconds: u64,
}

/// Reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Name of the pairwise decision heuristic; unrecognized names fall
    /// back to the precedence baseline.
    pub heuristic: String,
    /// Source domains whose descriptions take precedence during merges.
    pub trusted_domains: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: None,
                model: "gpt-3.5-turbo".to_string(),
                temperature: 0.0,
                max_reply_tokens: 1,
                context_window_tokens: 4096,
                requests_per_minute: 3500,
                tokens_per_minute: 90000,
                timeout_seconds: 30,
                workers: 5,
            },
            filter: FilterConfig {
                scope: "all".to_string(),
                separate_identifiers: false,
                min_description_chars: 20,
                max_description_chars: 16000,
                per_record_budget_seconds: 60,
            },
            reconciler: ReconcilerConfig {
                heuristic: "precedence".to_string(),
                trusted_domains: vec![
                    "nvd.nist.gov".to_string(),
                    "cve.mitre.org".to_string(),
                    "access.redhat.com".to_string(),
                    "security-tracker.debian.org".to_string(),
                    "msrc.microsoft.com".to_string(),
                ],
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("VULNINTEL").separator("__"));

        // Override with environment-specific config if ENV is set
        if let Ok(env) = std::env::var("ENV") {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{}", env)).required(false));
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_complete() {
        let config = Config::default();
        assert_eq!(config.model.workers, 5);
        assert_eq!(config.model.requests_per_minute, 3500);
        assert_eq!(config.model.tokens_per_minute, 90000);
        assert_eq!(config.filter.scope, "all");
        assert!(
            config
                .reconciler
                .trusted_domains
                .contains(&"nvd.nist.gov".to_string())
        );
    }
}
