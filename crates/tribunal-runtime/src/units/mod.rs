//! Model-backed units.
//!
//! Each unit holds a shared [`LlmProvider`](crate::providers::LlmProvider)
//! and a validated config. Like the deterministic units in `tribunal-core`,
//! they never mutate their input state.

mod answerer;
mod score_judge;
mod verifier;

pub use answerer::{Answerer, AnswererConfig};
pub use score_judge::{ScoreJudge, ScoreJudgeConfig};
pub use verifier::{Verifier, VerifierConfig};

use tribunal_core::{keys, EvalError, State, MAX_CONTENT_BYTES};

use crate::providers::Completion;

/// Default upper bound on parallel model calls.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Fold usage into `budget` if the caller is tracking one.
///
/// Runs once per unit invocation; a state without a budget comes back as is.
pub(crate) fn fold_budget(state: State, tokens: u64, calls: u64) -> Result<State, EvalError> {
    let Some(current) = state.get(keys::BUDGET)? else {
        return Ok(state);
    };
    let mut budget = *current;
    budget.safe_add_tokens(tokens);
    budget.safe_add_calls(calls);
    Ok(state.with(keys::BUDGET, budget))
}

/// Total tokens across `completions`, saturating.
pub(crate) fn total_tokens<'a>(completions: impl IntoIterator<Item = &'a Completion>) -> u64 {
    completions
        .into_iter()
        .fold(0u64, |sum, c| sum.saturating_add(c.total_tokens()))
}

/// Reject model output larger than any state value may be.
pub(crate) fn check_content_size(what: &str, text: &str) -> Result<(), EvalError> {
    if text.len() > MAX_CONTENT_BYTES {
        return Err(EvalError::InputTooLarge {
            what: what.to_string(),
            actual: text.len(),
            limit: MAX_CONTENT_BYTES,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tribunal_core::BudgetReport;

    #[test]
    fn test_fold_without_budget_is_noop() {
        let state = State::new().with(keys::QUESTION, "q".to_string());
        let out = fold_budget(state.clone(), 100, 3).unwrap();
        assert!(!out.contains(keys::BUDGET));
        assert_eq!(out.len(), state.len());
    }

    #[test]
    fn test_fold_saturates() {
        let state = State::new().with(
            keys::BUDGET,
            BudgetReport {
                tokens_used: u64::MAX - 1,
                calls_made: 4,
            },
        );
        let out = fold_budget(state, 10, 2).unwrap();
        let budget = out.require(keys::BUDGET).unwrap();
        assert_eq!(budget.tokens_used, u64::MAX);
        assert_eq!(budget.calls_made, 6);
    }

    #[test]
    fn test_content_size_limit() {
        assert!(check_content_size("answer", "short").is_ok());
        let huge = "x".repeat(MAX_CONTENT_BYTES + 1);
        assert!(matches!(
            check_content_size("answer", &huge),
            Err(EvalError::InputTooLarge { .. })
        ));
    }
}
