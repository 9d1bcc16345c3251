//! Language-model provider abstraction.
//!
//! Units never talk to a model directly; they go through [`LlmProvider`],
//! shared as `Arc<dyn LlmProvider>`. Network-backed providers live with the
//! embedder. [`ScriptedProvider`] answers from a script and is what tests and
//! dry runs use.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tribunal_core::{Context, EvalError};

use crate::patterns;

mod scripted;

pub use scripted::{RecordedCall, ScriptedProvider};

/// Errors from LLM providers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Authentication failed")]
    Auth,

    /// Untyped failure; only its message is known
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    pub fn other(message: impl Into<String>) -> Self {
        ProviderError::Other(message.into())
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Typed variants decide directly. [`ProviderError::Other`] falls back to
    /// matching the message against known transient patterns.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(_) | ProviderError::RateLimited { .. } | ProviderError::Timeout(_) => {
                true
            }
            ProviderError::Api { status, message } => {
                *status == 429 || (500..600).contains(status) || patterns::is_transient_message(message)
            }
            ProviderError::Auth => false,
            ProviderError::Other(message) => patterns::is_transient_message(message),
        }
    }
}

impl From<ProviderError> for EvalError {
    fn from(err: ProviderError) -> Self {
        EvalError::Model {
            transient: err.is_transient(),
            message: err.to_string(),
        }
    }
}

/// Structured-output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    JsonObject,
}

/// Generation options for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Sampling temperature (0.0 - 1.0)
    pub temperature: f64,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Ask for a JSON object when the model supports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 500,
            response_format: None,
        }
    }
}

impl CompletionOptions {
    pub fn new(temperature: f64, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
            response_format: None,
        }
    }

    pub fn json(mut self) -> Self {
        self.response_format = Some(ResponseFormat::JsonObject);
        self
    }
}

/// Response text plus token usage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Completion {
    /// Generated text
    pub text: String,
    /// Prompt tokens, as reported by the provider
    pub tokens_in: u64,
    /// Generated tokens
    pub tokens_out: u64,
}

impl Completion {
    pub fn total_tokens(&self) -> u64 {
        self.tokens_in.saturating_add(self.tokens_out)
    }
}

/// A text-completion backend.
///
/// Implementations must be safe to call concurrently; units fan out over a
/// single shared instance.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete `prompt`, discarding usage.
    async fn complete(
        &self,
        ctx: &Context,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        self.complete_with_usage(ctx, prompt, options)
            .await
            .map(|completion| completion.text)
    }

    async fn complete_with_usage(
        &self,
        ctx: &Context,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError>;

    /// Identifier of the backing model.
    fn model(&self) -> &str;

    /// Estimate tokens for a prompt.
    fn estimate_tokens(&self, text: &str) -> usize {
        // ~4 chars per token
        text.len().div_ceil(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_transient_classification() {
        assert!(ProviderError::RateLimited { retry_after: None }.is_transient());
        assert!(ProviderError::Timeout(Duration::from_secs(5)).is_transient());
        assert!(ProviderError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());
        assert!(!ProviderError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_transient());
        assert!(!ProviderError::Auth.is_transient());
    }

    #[test]
    fn test_opaque_errors_use_message_patterns() {
        assert!(ProviderError::other("upstream: connection reset by peer").is_transient());
        assert!(ProviderError::other("Temporary failure in name resolution").is_transient());
        assert!(!ProviderError::other("invalid api key").is_transient());
    }

    #[test]
    fn test_into_eval_error_keeps_classification() {
        let err: EvalError = ProviderError::other("502 Bad Gateway").into();
        assert!(matches!(err, EvalError::Model { transient: true, .. }));
    }

    #[test]
    fn test_response_format_wire_shape() {
        let options = CompletionOptions::new(0.2, 100).json();
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["response_format"], serde_json::json!({"type": "json_object"}));
    }
}
