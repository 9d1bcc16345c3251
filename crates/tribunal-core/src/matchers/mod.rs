//! Deterministic matchers.
//!
//! Matchers score every candidate against `reference_answer` without calling
//! a model. Output is one [`JudgeSummary`](crate::types::JudgeSummary) per
//! answer, in answer order, each with confidence 1.0.

mod exact;
mod fuzzy;

pub use exact::{ExactMatchConfig, ExactMatcher};
pub use fuzzy::{FuzzyAlgorithm, FuzzyMatchConfig, FuzzyMatcher};

use crate::error::EvalError;
use crate::types::{Answer, MAX_ANSWERS, MAX_CONTENT_BYTES};

/// Case-insensitive form of `s`.
///
/// Uppercasing first applies the full (multi-character) mappings, so `ß`
/// becomes `SS` and then `ss`; lowercasing alone would leave it as is.
pub fn fold(s: &str) -> String {
    s.to_uppercase().to_lowercase()
}

/// Apply the configured normalizations: optional trim, then optional fold.
pub fn normalize(s: &str, trim: bool, case_sensitive: bool) -> String {
    let s = if trim { s.trim() } else { s };
    if case_sensitive {
        s.to_string()
    } else {
        fold(s)
    }
}

/// Edit distance over Unicode scalar values.
pub fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `1 - distance / max(len_a, len_b)`; two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

/// Shared input limits for matchers.
pub(crate) fn check_inputs(reference: &str, answers: &[Answer]) -> Result<(), EvalError> {
    if reference.is_empty() {
        return Err(EvalError::MissingInput("reference_answer"));
    }
    if reference.len() > MAX_CONTENT_BYTES {
        return Err(EvalError::InputTooLarge {
            what: "reference_answer".to_string(),
            actual: reference.len(),
            limit: MAX_CONTENT_BYTES,
        });
    }
    if answers.is_empty() {
        return Err(EvalError::MissingInput("answers"));
    }
    if answers.len() > MAX_ANSWERS {
        return Err(EvalError::InputTooLarge {
            what: "answers".to_string(),
            actual: answers.len(),
            limit: MAX_ANSWERS,
        });
    }
    if let Some(answer) = answers.iter().find(|a| a.content.len() > MAX_CONTENT_BYTES) {
        return Err(EvalError::InputTooLarge {
            what: format!("answer {}", answer.id),
            actual: answer.content.len(),
            limit: MAX_CONTENT_BYTES,
        });
    }
    Ok(())
}

pub(crate) fn average(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fold_sharp_s() {
        assert_eq!(fold("straße"), fold("STRASSE"));
        assert_eq!(fold("STRASSE"), "strasse");
    }

    #[test]
    fn test_fold_dotted_capital_i() {
        assert_eq!(fold("\u{130}"), fold("i\u{307}"));
        assert_eq!(fold("\u{130}stanbul"), "i\u{307}stanbul");
    }

    #[test]
    fn test_levenshtein_basics() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(levenshtein(&chars("kitten"), &chars("sitting")), 3);
        assert_eq!(levenshtein(&chars(""), &chars("abc")), 3);
        assert_eq!(levenshtein(&chars("flaw"), &chars("lawn")), 2);
        assert_eq!(levenshtein(&chars("same"), &chars("same")), 0);
    }

    #[test]
    fn test_similarity_counts_characters_not_bytes() {
        assert_eq!(similarity("東京都庁", "東京都市"), 0.75);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
    }

    #[test]
    fn test_check_inputs() {
        let answers = vec![Answer::new("a1", "x")];
        assert_eq!(
            check_inputs("", &answers),
            Err(EvalError::MissingInput("reference_answer"))
        );
        assert_eq!(check_inputs("ref", &[]), Err(EvalError::MissingInput("answers")));

        let too_many = vec![Answer::new("a", "x"); MAX_ANSWERS + 1];
        assert!(matches!(
            check_inputs("ref", &too_many),
            Err(EvalError::InputTooLarge { .. })
        ));
        assert!(check_inputs("ref", &answers).is_ok());
    }

    proptest! {
        #[test]
        fn prop_fold_idempotent(s in "\\PC{0,40}") {
            let once = fold(&s);
            prop_assert_eq!(fold(&once), once);
        }

        #[test]
        fn prop_trim_idempotent(s in "\\PC{0,40}") {
            let once = normalize(&s, true, true);
            prop_assert_eq!(normalize(&once, true, true), once);
        }

        #[test]
        fn prop_similarity_bounded_and_symmetric(a in "\\PC{0,20}", b in "\\PC{0,20}") {
            let ab = similarity(&a, &b);
            prop_assert!((0.0..=1.0).contains(&ab));
            prop_assert_eq!(ab, similarity(&b, &a));
        }
    }
}
