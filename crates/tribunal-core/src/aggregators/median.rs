use crate::error::EvalError;

use super::{check_finite, resolve_tie, tied_indices, AggregatorConfig, Entropy, Selection};

fn midpoint(a: f64, b: f64) -> f64 {
    let mid = (a + b) / 2.0;
    if mid.is_finite() {
        mid
    } else {
        a / 2.0 + b / 2.0
    }
}

/// The aggregate is the median; the winner is the answer closest to it.
///
/// For an even count the median is the mean of the two middle values, so
/// the two middle answers are usually tied and the tie-breaker decides.
pub fn median(scores: &[f64], config: &AggregatorConfig) -> Result<Selection, EvalError> {
    if scores.is_empty() {
        return Err(EvalError::MissingInput("judge_scores"));
    }
    check_finite(scores)?;

    let mut sorted = scores.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let aggregate = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        midpoint(sorted[n / 2 - 1], sorted[n / 2])
    };

    if aggregate < config.min_score {
        return Err(EvalError::BelowMinimum {
            measure: "median score",
            value: aggregate,
            min_score: config.min_score,
        });
    }

    let distances: Vec<f64> = scores.iter().map(|s| (s - aggregate).abs()).collect();
    let closest = distances.iter().copied().fold(f64::INFINITY, f64::min);
    let tied = tied_indices(&distances, closest);
    tracing::debug!(median = aggregate, tied = tied.len(), "median candidates");

    let index = resolve_tie(&tied, aggregate, config.tie_breaker, Entropy::Fast)?;
    Ok(Selection { index, aggregate })
}
