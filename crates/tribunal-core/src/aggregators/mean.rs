use crate::error::EvalError;

use super::{argmax, check_finite, AggregatorConfig, Entropy, MinScoreBasis, Selection};

/// Arithmetic mean of `scores`, computed so that finite inputs never overflow.
pub(crate) fn arithmetic_mean(scores: &[f64]) -> f64 {
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    if mean.is_finite() {
        mean
    } else {
        scores.iter().map(|s| s / n).sum()
    }
}

/// The aggregate is the mean; the winner is the highest-scoring answer.
///
/// `min_score` is checked against the mean unless
/// [`MinScoreBasis::Max`] is configured.
pub fn mean(scores: &[f64], config: &AggregatorConfig) -> Result<Selection, EvalError> {
    if scores.is_empty() {
        return Err(EvalError::MissingInput("judge_scores"));
    }
    check_finite(scores)?;

    let aggregate = arithmetic_mean(scores);
    let (measure, value) = match config.min_score_basis {
        MinScoreBasis::Mean => ("mean score", aggregate),
        MinScoreBasis::Max => (
            "max score",
            scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        ),
    };
    if value < config.min_score {
        return Err(EvalError::BelowMinimum {
            measure,
            value,
            min_score: config.min_score,
        });
    }

    let index = argmax(scores, config.tie_breaker, Entropy::Secure)?;
    Ok(Selection { index, aggregate })
}
