//! Answer Service - turns one visitor message into one grounded answer
//!
//! Flow: validate request → retrieve context → assemble prompt →
//! call the language model with bounded retries → answer or apology.

mod retry;

pub use retry::{generate_with_retry, JitterSource, NoJitter, RandomJitter, RetryOutcome, RetryPolicy};

use axum::http::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::knowledge::{ContextRetriever, KnowledgeBase};
use crate::llm::LanguageModel;

/// Longest accepted visitor message, in characters
pub const MAX_MESSAGE_CHARS: u64 = 2000;

/// Persona instructions; `{owner}` is replaced with the owner's name.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant for {owner}'s portfolio website. \
Your purpose is to provide information about {owner} based on the provided context. \
Be friendly and professional. If you don't know the answer, say, \
\"I am an AI assistant and do not have that information. Please contact {owner} directly.\"";

/// Chat request body
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[serde(default)]
    #[validate(length(max = MAX_MESSAGE_CHARS))]
    pub message: Option<String>,
}

/// Successful chat response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// An answer plus bookkeeping for logs and metrics
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub answer: String,
    pub attempts: u32,
    pub context_chars: usize,
}

/// Tunables of the answer service
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub system_prompt: String,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self::for_owner("the site owner")
    }
}

impl ChatOptions {
    pub fn for_owner(owner: &str) -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.replace("{owner}", owner),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let owner = &config.assistant.owner_name;
        let template = config
            .assistant
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);

        Self {
            system_prompt: template.replace("{owner}", owner),
            retry: RetryPolicy::from(&config.assistant.retry),
            request_timeout: config.request_timeout(),
        }
    }
}

/// Validates chat requests and answers them through the language model
pub struct ChatService {
    retriever: ContextRetriever,
    model: Arc<dyn LanguageModel>,
    jitter: Arc<dyn JitterSource>,
    options: ChatOptions,
}

impl ChatService {
    pub fn new(retriever: ContextRetriever, model: Arc<dyn LanguageModel>, options: ChatOptions) -> Self {
        Self {
            retriever,
            model,
            jitter: Arc::new(RandomJitter),
            options,
        }
    }

    /// Wire the service from configuration and an already loaded knowledge base.
    pub fn from_config(
        config: &AppConfig,
        knowledge: Arc<KnowledgeBase>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        let retriever = ContextRetriever::new(
            knowledge,
            config.knowledge.overview_id.clone(),
            config.assistant.owner_name.clone(),
        );
        Self::new(retriever, model, ChatOptions::from_config(config))
    }

    /// Replace the jitter source (tests use [`NoJitter`]).
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        self.retriever.knowledge()
    }

    /// Validate method and body, returning the visitor message.
    pub fn parse_request(method: &Method, body: &[u8]) -> Result<String> {
        if method != Method::POST {
            return Err(AppError::MethodNotAllowed {
                method: method.to_string(),
            });
        }

        let missing = || AppError::MissingField {
            field: "message".to_string(),
        };

        let request: ChatRequest = serde_json::from_slice(body).map_err(|_| missing())?;
        if request.message.as_deref().map_or(true, str::is_empty) {
            return Err(missing());
        }
        request.validate().map_err(|_| AppError::MessageTooLong {
            limit: MAX_MESSAGE_CHARS,
        })?;

        request.message.ok_or_else(missing)
    }

    /// Grounded prompt: persona, then context (if any), then the question.
    pub fn build_prompt(&self, context: &str, message: &str) -> String {
        let mut prompt = String::with_capacity(
            self.options.system_prompt.len() + context.len() + message.len() + 32,
        );
        prompt.push_str(&self.options.system_prompt);
        prompt.push_str("\n\n");
        if !context.is_empty() {
            prompt.push_str(context);
            prompt.push_str("\n\n");
        }
        prompt.push_str("User Question: ");
        prompt.push_str(message);
        prompt
    }

    /// Handle one HTTP call: method check, body validation, then answer.
    pub async fn handle(&self, method: &Method, body: &[u8]) -> Result<ChatOutcome> {
        let message = Self::parse_request(method, body)?;
        self.answer(&message).await
    }

    /// Answer a validated message within the overall request budget.
    pub async fn answer(&self, message: &str) -> Result<ChatOutcome> {
        let budget = self.options.request_timeout;
        match tokio::time::timeout(budget, self.answer_unbounded(message)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::DeadlineExceeded {
                timeout_ms: budget.as_millis() as u64,
            }),
        }
    }

    async fn answer_unbounded(&self, message: &str) -> Result<ChatOutcome> {
        let context = self.retriever.retrieve_relevant_context(message);
        tracing::debug!(context_chars = context.len(), "Context retrieved");

        let prompt = self.build_prompt(&context, message);

        let outcome = generate_with_retry(
            self.model.as_ref(),
            &prompt,
            &self.options.retry,
            self.jitter.as_ref(),
        )
        .await;

        let answer = outcome.result?;
        Ok(ChatOutcome {
            answer,
            attempts: outcome.attempts,
            context_chars: context.len(),
        })
    }
}
