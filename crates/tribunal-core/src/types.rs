//! Values that flow between units.

use serde::{Deserialize, Serialize};

/// Upper bound on any single text value (answer content, reference, question).
pub const MAX_CONTENT_BYTES: usize = 10 * 1024 * 1024;

/// Upper bound on the number of candidates a deterministic matcher accepts.
pub const MAX_ANSWERS: usize = 10_000;

/// A candidate response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// `<unit-name>_answer_<1-based-index>` when produced by a unit
    pub id: String,

    /// Answer text, as generated or supplied
    pub content: String,
}

impl Answer {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }

    /// Build the id a producing unit assigns to its `index`-th (0-based) answer.
    pub fn id_for(unit: &str, index: usize) -> String {
        format!("{}_answer_{}", unit, index + 1)
    }
}

/// One judge's verdict on one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeSummary {
    /// Score on the producing unit's scale
    pub score: f64,

    /// Why the score was given
    pub reasoning: String,

    /// 0.0 - 1.0; deterministic producers always emit 1.0
    pub confidence: f64,
}

impl JudgeSummary {
    /// Summary from a deterministic scorer.
    pub fn deterministic(score: f64, reasoning: impl Into<String>) -> Self {
        Self {
            score,
            reasoning: reasoning.into(),
            confidence: 1.0,
        }
    }
}

/// The aggregate decision over all candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// `<aggregator-name>_verdict`
    pub id: String,

    /// The selected answer, copied from the input list
    pub winner_answer: Answer,

    /// Max, mean or median of the scores, per aggregator
    pub aggregate_score: f64,

    /// Set by the verifier when its confidence is below threshold
    #[serde(default)]
    pub requires_human_review: bool,
}

impl Verdict {
    pub fn id_for(aggregator: &str) -> String {
        format!("{}_verdict", aggregator)
    }
}

/// Running token and call counters for model-backed units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetReport {
    /// Prompt plus generated tokens
    pub tokens_used: u64,
    /// Successful model calls
    pub calls_made: u64,
}

impl BudgetReport {
    /// Add tokens, saturating at `u64::MAX` instead of wrapping.
    pub fn safe_add_tokens(&mut self, tokens: u64) {
        self.tokens_used = self.tokens_used.saturating_add(tokens);
    }

    /// Count one call, saturating at `u64::MAX`.
    pub fn safe_increment_calls(&mut self) {
        self.safe_add_calls(1);
    }

    pub fn safe_add_calls(&mut self, calls: u64) {
        self.calls_made = self.calls_made.saturating_add(calls);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_answer_ids_are_one_based() {
        assert_eq!(Answer::id_for("gen", 0), "gen_answer_1");
        assert_eq!(Answer::id_for("gen", 9), "gen_answer_10");
    }

    #[test]
    fn test_verdict_id() {
        assert_eq!(Verdict::id_for("max_pool"), "max_pool_verdict");
    }

    #[test]
    fn test_budget_saturates() {
        let mut budget = BudgetReport {
            tokens_used: u64::MAX - 5,
            calls_made: u64::MAX,
        };
        budget.safe_add_tokens(100);
        budget.safe_increment_calls();
        assert_eq!(budget.tokens_used, u64::MAX);
        assert_eq!(budget.calls_made, u64::MAX);
    }

    #[test]
    fn test_verdict_review_flag_defaults_false() {
        let json = r#"{"id":"m_verdict","winner_answer":{"id":"a","content":"x"},"aggregate_score":0.5}"#;
        let verdict: Verdict = serde_json::from_str(json).unwrap();
        assert!(!verdict.requires_human_review);
    }

    proptest! {
        #[test]
        fn prop_add_tokens_never_wraps(start in any::<u64>(), add in any::<u64>()) {
            let mut budget = BudgetReport { tokens_used: start, calls_made: 0 };
            budget.safe_add_tokens(add);
            prop_assert!(budget.tokens_used >= start);
        }

        #[test]
        fn prop_increment_calls_saturates(start in any::<u64>()) {
            let mut budget = BudgetReport { tokens_used: 0, calls_made: start };
            budget.safe_increment_calls();
            prop_assert_eq!(budget.calls_made, start.saturating_add(1));
        }
    }
}
