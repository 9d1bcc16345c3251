//! Resilience patterns for model calls.
//!
//! - Retry with exponential backoff for transient provider errors
//! - Context-window budgeting and proportional answer truncation

mod budget;
mod retry;

pub use budget::{
    context_limit, estimate_tokens, ContextBudget, CHARS_PER_TOKEN, TEMPLATE_OVERHEAD_TOKENS,
    TRUNCATION_MARKER,
};
pub use retry::RetryPolicy;
