//! Folio Assistant Common Library
//!
//! Shared code for the portfolio chat backend including:
//! - Knowledge base loading and keyword retrieval
//! - Language-model provider abstraction
//! - The answer service with its retry loop
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod chat;
pub mod config;
pub mod errors;
pub mod knowledge;
pub mod llm;
pub mod metrics;

// Re-export commonly used types
pub use chat::{ChatOutcome, ChatService};
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use knowledge::{ContextRetriever, KnowledgeBase, KnowledgeEntry};
pub use llm::LanguageModel;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
