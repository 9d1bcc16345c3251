//! Shared detection patterns for provider errors and model identifiers.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Error messages worth retrying: rate limits, timeouts, dropped
    /// connections, 5xx gateway failures and temporary resolver errors.
    pub static ref TRANSIENT_ERROR_PATTERN: Regex = Regex::new(
        r"(?i)rate[\s_-]?limit|too many requests|\b429\b|timed?[\s_-]?out|connection (reset|refused|closed|aborted)|broken pipe|\b50[0234]\b|bad gateway|service unavailable|gateway timeout|internal server error|temporar(y|ily) (failure|unavailable)|overloaded"
    ).unwrap();

    /// Model families known to accept a JSON response format.
    pub static ref JSON_MODE_MODEL_PATTERN: Regex = Regex::new(
        r"(?i)gpt-4|gpt-3\.5-turbo|\bo[134](-|$)|gemini|mistral|mixtral|llama-3|json"
    ).unwrap();
}

/// Check if an opaque error message looks transient.
pub fn is_transient_message(message: &str) -> bool {
    TRANSIENT_ERROR_PATTERN.is_match(message)
}

/// Check if a model id suggests support for JSON response mode.
pub fn supports_json_mode(model: &str) -> bool {
    JSON_MODE_MODEL_PATTERN.is_match(model)
}
