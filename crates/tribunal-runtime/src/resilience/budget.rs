//! Context-window budgeting for model prompts.
//!
//! Token counts are estimated at four characters per token. Each model
//! family gets a conservative context cap; unknown models get a low default.

use tribunal_core::EvalError;

use crate::sanitize::FENCE_OVERHEAD_CHARS;

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Tokens reserved for the fixed parts of a verifier prompt.
pub const TEMPLATE_OVERHEAD_TOKENS: usize = 500;

/// Appended to every answer shortened to fit the budget.
pub const TRUNCATION_MARKER: &str = "\n[... truncated to fit context window ...]";

const CLAUDE_LIMIT: usize = 100_000;
const GEMINI_LIMIT: usize = 30_000;
const GPT_LIMIT: usize = 8_000;
const DEFAULT_LIMIT: usize = 4_000;

/// Estimated tokens for `text`, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Conservative context limit, in tokens, for a model id.
pub fn context_limit(model: &str) -> usize {
    let model = model.to_ascii_lowercase();
    if model.contains("claude") {
        CLAUDE_LIMIT
    } else if model.contains("gemini") {
        GEMINI_LIMIT
    } else if model.contains("gpt") {
        GPT_LIMIT
    } else {
        DEFAULT_LIMIT
    }
}

/// Token budget for one prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    limit: usize,
}

impl ContextBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn for_model(model: &str) -> Self {
        Self::new(context_limit(model))
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Fail if `prompt` is estimated to exceed the limit; otherwise return its estimate.
    pub fn check_prompt(&self, prompt: &str) -> Result<usize, EvalError> {
        let estimated = estimate_tokens(prompt);
        if estimated > self.limit {
            return Err(EvalError::ContextTooLarge {
                estimated,
                limit: self.limit,
            });
        }
        Ok(estimated)
    }

    /// Tokens left for answers after the question, scores and template overhead.
    pub fn available_for_answers(&self, question_tokens: usize, score_tokens: usize) -> usize {
        self.limit
            .saturating_sub(question_tokens)
            .saturating_sub(score_tokens)
            .saturating_sub(TEMPLATE_OVERHEAD_TOKENS)
    }

    /// Shrink `answers` to fit in `available` tokens once fenced.
    ///
    /// Answers that already fit come back unchanged. Otherwise every answer
    /// is charged its fence and a [`TRUNCATION_MARKER`] up front, and the
    /// rest of the budget is split in proportion to answer length. When not
    /// even the per-answer overhead fits, the list is empty.
    pub fn fit_answers(&self, answers: &[String], available: usize) -> Vec<String> {
        let budget_chars = available.saturating_mul(CHARS_PER_TOKEN);
        let total_chars: usize = answers.iter().map(|a| a.chars().count()).sum();
        let fenced_chars = total_chars + answers.len() * FENCE_OVERHEAD_CHARS;
        if fenced_chars <= budget_chars {
            return answers.to_vec();
        }

        let marker_chars = TRUNCATION_MARKER.chars().count();
        let overhead = answers.len().saturating_mul(marker_chars + FENCE_OVERHEAD_CHARS);
        let usable = budget_chars.saturating_sub(overhead);
        if usable == 0 {
            tracing::debug!(
                answers = answers.len(),
                available_tokens = available,
                "no context budget left for answers"
            );
            return Vec::new();
        }
        tracing::debug!(
            answers = answers.len(),
            total_chars,
            available_tokens = available,
            "truncating answers proportionally"
        );

        answers
            .iter()
            .map(|answer| {
                let chars = answer.chars().count();
                let share = (chars as u128 * usable as u128 / total_chars.max(1) as u128) as usize;
                if share >= chars {
                    return answer.clone();
                }
                let mut out: String = answer.chars().take(share).collect();
                out.push_str(TRUNCATION_MARKER);
                out
            })
            .collect()
    }
}
