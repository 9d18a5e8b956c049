//! Configuration management for the Folio Assistant
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{AppError, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Language-model provider configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Answer service configuration
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Knowledge base configuration
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider: gemini, openai
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// API key; falls back to GOOGLE_API_KEY / OPENAI_API_KEY
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Per-attempt HTTP timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantConfig {
    /// Name used in the persona prompt and the context header
    #[serde(default = "default_owner_name")]
    pub owner_name: String,

    /// Persona prompt override; `{owner}` is replaced with `owner_name`
    pub system_prompt: Option<String>,

    /// Overall budget for one chat request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retry policy for overloaded providers
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total provider calls, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Exponential base delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound (exclusive) of the random jitter in milliseconds
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KnowledgeConfig {
    /// Path of the JSON knowledge base
    #[serde(default = "default_knowledge_path")]
    pub path: String,

    /// Id of the entry returned for skill questions
    #[serde(default = "default_overview_id")]
    pub overview_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting on the chat route
    #[serde(default)]
    pub enabled: bool,

    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Expose Prometheus metrics on /metrics
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_max_body_bytes() -> usize { 16 * 1024 }
fn default_llm_provider() -> String { "gemini".to_string() }
fn default_llm_model() -> String { "gemini-2.5-flash".to_string() }
fn default_llm_timeout() -> u64 { 10 }
fn default_owner_name() -> String { "the site owner".to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_max_attempts() -> u32 { 5 }
fn default_base_delay_ms() -> u64 { 1000 }
fn default_jitter_ms() -> u64 { 1000 }
fn default_knowledge_path() -> String { "data/knowledge.json".to_string() }
fn default_overview_id() -> String { "profile_overview".to_string() }
fn default_rate_limit() -> u32 { 5 }
fn default_burst() -> u32 { 20 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_enabled() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            api_base: None,
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            owner_name: default_owner_name(),
            system_prompt: None,
            request_timeout_secs: default_request_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            path: default_knowledge_path(),
            overview_id: default_overview_id(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl LlmConfig {
    /// Environment variable consulted when `api_key` is not configured.
    pub fn fallback_key_var(&self) -> &'static str {
        match self.provider.as_str() {
            "openai" => "OPENAI_API_KEY",
            _ => "GOOGLE_API_KEY",
        }
    }

    /// Per-attempt timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        let mut config: AppConfig = config.try_deserialize()?;
        config.apply_key_fallback(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Fill a missing API key from the provider's conventional variable.
    pub fn apply_key_fallback<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let configured = self.llm.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        if !configured {
            self.llm.api_key = lookup(self.llm.fallback_key_var());
        }
    }

    /// Reject configurations the service cannot start with.
    pub fn validate(&self) -> Result<()> {
        let has_key = self.llm.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        if !has_key {
            return Err(AppError::Configuration {
                message: format!(
                    "{} environment variable is not set",
                    self.llm.fallback_key_var()
                ),
            });
        }

        if self.assistant.retry.max_attempts == 0 {
            return Err(AppError::Configuration {
                message: "assistant.retry.max_attempts must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Get the overall chat request budget as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.assistant.request_timeout_secs)
    }
}
