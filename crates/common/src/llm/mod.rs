//! Language-model provider abstraction
//!
//! Provides a single-prompt text generation interface over:
//! - Google Gemini (generateContent)
//! - OpenAI-compatible chat completions
//!
//! Providers report upstream HTTP 503 as [`AppError::ProviderOverloaded`];
//! every other failure is non-retryable.

mod gemini;
mod openai;

pub use gemini::GeminiModel;
pub use openai::OpenAiModel;

use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};

/// Trait for text generation
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate an answer for a single combined prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create a language model based on configuration
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| AppError::Configuration {
            message: format!("{} environment variable is not set", config.fallback_key_var()),
        })?;

    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiModel::new(
            api_key,
            config.model.clone(),
            config.api_base.clone(),
            config.timeout(),
        )?)),
        "openai" => Ok(Arc::new(OpenAiModel::new(
            api_key,
            config.model.clone(),
            config.api_base.clone(),
            config.timeout(),
        )?)),
        other => Err(AppError::Configuration {
            message: format!("unknown llm provider '{}'", other),
        }),
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// Map a non-success upstream status to a provider error.
pub(crate) fn status_error(status: StatusCode, body: String) -> AppError {
    if status == StatusCode::SERVICE_UNAVAILABLE {
        AppError::ProviderOverloaded { message: body }
    } else {
        AppError::Provider {
            status: Some(status.as_u16()),
            message: body,
        }
    }
}

/// Map a transport failure, keeping timeouts distinct.
pub(crate) fn send_error(err: reqwest::Error, timeout: Duration) -> AppError {
    if err.is_timeout() {
        AppError::ProviderTimeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        AppError::HttpClient(err)
    }
}

/// One scripted provider reaction.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(String),
    Overloaded,
    Fail(u16),
    /// Wait before replying
    Slow(Duration, String),
}

/// Scripted model for testing
///
/// Replays its script in order, records every prompt, and fails with a
/// non-retryable error once the script runs out.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Scripted>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A model that answers its first prompt with `text`.
    pub fn replying(text: &str) -> Self {
        Self::new([Scripted::Reply(text.to_string())])
    }

    /// Number of `generate` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Overloaded) => Err(AppError::ProviderOverloaded {
                message: "The model is overloaded. Please try again later.".to_string(),
            }),
            Some(Scripted::Fail(status)) => Err(AppError::Provider {
                status: Some(status),
                message: "scripted failure".to_string(),
            }),
            Some(Scripted::Slow(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            None => Err(AppError::Provider {
                status: None,
                message: "script exhausted".to_string(),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, "overloaded".into());
        assert!(err.is_overloaded());

        let err = status_error(StatusCode::TOO_MANY_REQUESTS, "quota".into());
        assert!(!err.is_overloaded());
        assert!(matches!(err, AppError::Provider { status: Some(429), .. }));
    }

    #[test]
    fn test_factory_requires_key() {
        let config = LlmConfig::default();
        assert!(create_language_model(&config).is_err());
    }

    #[test]
    fn test_factory_by_provider() {
        let mut config = LlmConfig {
            api_key: Some("key".to_string()),
            ..LlmConfig::default()
        };
        let model = create_language_model(&config).unwrap();
        assert_eq!(model.model_name(), "gemini-2.5-flash");

        config.provider = "openai".to_string();
        config.model = "gpt-4o-mini".to_string();
        let model = create_language_model(&config).unwrap();
        assert_eq!(model.model_name(), "gpt-4o-mini");

        config.provider = "carrier-pigeon".to_string();
        assert!(create_language_model(&config).is_err());
    }

    #[tokio::test]
    async fn test_scripted_model_replays_in_order() {
        let model = ScriptedModel::new([Scripted::Overloaded, Scripted::Reply("hi".into())]);
        assert!(model.generate("a").await.unwrap_err().is_overloaded());
        assert_eq!(model.generate("b").await.unwrap(), "hi");
        assert!(!model.generate("c").await.unwrap_err().is_overloaded());
        assert_eq!(model.calls(), 3);
        assert_eq!(model.prompts(), vec!["a", "b", "c"]);
    }
}
