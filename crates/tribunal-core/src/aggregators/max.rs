use crate::error::EvalError;

use super::{argmax, check_finite, AggregatorConfig, Entropy, Selection};

/// Highest score wins; the aggregate is the winner's score.
pub fn max(scores: &[f64], config: &AggregatorConfig) -> Result<Selection, EvalError> {
    if scores.is_empty() {
        return Err(EvalError::MissingInput("judge_scores"));
    }
    check_finite(scores)?;

    let best = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if best < config.min_score {
        return Err(EvalError::BelowMinimum {
            measure: "max score",
            value: best,
            min_score: config.min_score,
        });
    }

    let index = argmax(scores, config.tie_breaker, Entropy::Secure)?;
    Ok(Selection {
        index,
        aggregate: scores[index],
    })
}
