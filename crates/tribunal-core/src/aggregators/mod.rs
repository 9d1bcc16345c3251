//! Score aggregation.
//!
//! An aggregator reduces `judge_scores` to one [`Verdict`]: a winning answer
//! and an aggregate score. The reduction itself is a pure function over a
//! slice of finite scores ([`max`], [`mean`], [`median`]); [`Aggregator`]
//! wraps it as a unit that applies the score-count policy, rejects
//! non-finite inputs and writes `verdict`.

mod max;
mod mean;
mod median;

pub use max::max;
pub use mean::mean;
pub use median::median;

use std::time::Instant;

use async_trait::async_trait;
use rand::rngs::{OsRng, SmallRng};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::field::Empty;

use crate::config::{self, lenient, Options, UnitConfig};
use crate::context::Context;
use crate::error::{EvalError, ResultExt, UnitError};
use crate::state::{keys, State};
use crate::types::{Answer, JudgeSummary, Verdict};
use crate::unit::{Unit, UnitKind};

/// Scores closer than this are treated as equal.
pub const TIE_TOLERANCE: f64 = 1e-9;

/// How to pick among tied candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreaker {
    /// Lowest index wins
    #[default]
    First,
    /// Uniformly random among the tied
    Random,
    /// Refuse to pick
    Error,
}

/// Which value the mean aggregator compares against `min_score`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinScoreBasis {
    #[default]
    Mean,
    Max,
}

/// Shared aggregator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregatorConfig {
    /// How to pick among equally scored answers
    pub tie_breaker: TieBreaker,

    /// Aggregates below this fail (0.0 - 1.0)
    #[serde(deserialize_with = "lenient::deserialize")]
    pub min_score: f64,

    /// Fail on a count mismatch instead of truncating to the shorter side
    pub require_all_scores: bool,

    /// Only consulted by the mean aggregator
    pub min_score_basis: MinScoreBasis,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            tie_breaker: TieBreaker::First,
            min_score: 0.0,
            require_all_scores: false,
            min_score_basis: MinScoreBasis::Mean,
        }
    }
}

impl UnitConfig for AggregatorConfig {
    fn validate(&self) -> Result<(), EvalError> {
        config::check_range("min_score", self.min_score, 0.0, 1.0)
    }
}

/// Result of a reduction: index of the winner and the aggregate score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub index: usize,
    pub aggregate: f64,
}

/// Random source used for `random` tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Entropy {
    /// Operating-system CSPRNG
    Secure,
    /// Seeded-from-entropy small PRNG
    Fast,
}

pub(crate) fn check_finite(scores: &[f64]) -> Result<(), EvalError> {
    match scores.iter().find(|s| !s.is_finite()) {
        Some(bad) => Err(EvalError::NonFiniteScore(*bad)),
        None => Ok(()),
    }
}

/// Indices whose value lies within [`TIE_TOLERANCE`] of `target`.
pub(crate) fn tied_indices(values: &[f64], target: f64) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v == target || (**v - target).abs() <= TIE_TOLERANCE)
        .map(|(i, _)| i)
        .collect()
}

pub(crate) fn resolve_tie(
    tied: &[usize],
    score: f64,
    tie_breaker: TieBreaker,
    entropy: Entropy,
) -> Result<usize, EvalError> {
    match tied {
        [] => Err(EvalError::MissingInput("judge_scores")),
        [only] => Ok(*only),
        _ => match tie_breaker {
            TieBreaker::First => Ok(tied[0]),
            TieBreaker::Error => Err(EvalError::Tie(format!(
                "{} answers with score {:.3}",
                tied.len(),
                score
            ))),
            TieBreaker::Random => {
                let pick = match entropy {
                    Entropy::Secure => OsRng.gen_range(0..tied.len()),
                    Entropy::Fast => SmallRng::from_entropy().gen_range(0..tied.len()),
                };
                Ok(tied[pick])
            }
        },
    }
}

/// Index and value of the largest score, with ties resolved per `tie_breaker`.
pub(crate) fn argmax(
    scores: &[f64],
    tie_breaker: TieBreaker,
    entropy: Entropy,
) -> Result<usize, EvalError> {
    let best = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    resolve_tie(&tied_indices(scores, best), best, tie_breaker, entropy)
}

/// Apply the score-count policy, returning equally long slices.
pub fn align<'a>(
    answers: &'a [Answer],
    scores: &'a [JudgeSummary],
    require_all_scores: bool,
) -> Result<(&'a [Answer], &'a [JudgeSummary]), EvalError> {
    if answers.len() != scores.len() {
        if require_all_scores {
            return Err(EvalError::ScoreCountMismatch {
                answers: answers.len(),
                scores: scores.len(),
            });
        }
        tracing::warn!(
            answers = answers.len(),
            scores = scores.len(),
            "score count mismatch, truncating to the shorter list"
        );
    }
    let k = answers.len().min(scores.len());
    Ok((&answers[..k], &scores[..k]))
}

/// Reduction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Max,
    Mean,
    Median,
}

impl Method {
    pub fn apply(&self, scores: &[f64], config: &AggregatorConfig) -> Result<Selection, EvalError> {
        match self {
            Method::Max => max(scores, config),
            Method::Mean => mean(scores, config),
            Method::Median => median(scores, config),
        }
    }

    pub fn unit_kind(&self) -> UnitKind {
        match self {
            Method::Max => UnitKind::MaxPool,
            Method::Mean => UnitKind::MeanPool,
            Method::Median => UnitKind::MedianPool,
        }
    }

    pub fn from_kind(kind: UnitKind) -> Option<Method> {
        match kind {
            UnitKind::MaxPool => Some(Method::Max),
            UnitKind::MeanPool => Some(Method::Mean),
            UnitKind::MedianPool => Some(Method::Median),
            _ => None,
        }
    }
}

/// Aggregator unit: reads `answers` and `judge_scores`, writes `verdict`.
#[derive(Debug, Clone)]
pub struct Aggregator {
    name: String,
    method: Method,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(
        name: impl Into<String>,
        method: Method,
        config: AggregatorConfig,
    ) -> Result<Self, UnitError> {
        let name = name.into();
        config::validate_name(&name).in_unit(&name, "validating configuration")?;
        config.validate().in_unit(&name, "validating configuration")?;
        Ok(Self {
            name,
            method,
            config,
        })
    }

    pub fn from_options(
        name: impl Into<String>,
        method: Method,
        options: &Options,
    ) -> Result<Self, UnitError> {
        let name = name.into();
        let config = config::from_options(&AggregatorConfig::default(), options)
            .in_unit(&name, "parsing configuration")?;
        Self::new(name, method, config)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Pick a winner among `answers` using the paired `scores`.
    pub fn decide(&self, answers: &[Answer], scores: &[JudgeSummary]) -> Result<Verdict, EvalError> {
        if answers.is_empty() {
            return Err(EvalError::MissingInput("answers"));
        }
        if scores.is_empty() {
            return Err(EvalError::MissingInput("judge_scores"));
        }
        let (answers, scores) = align(answers, scores, self.config.require_all_scores)?;
        let values: Vec<f64> = scores.iter().map(|s| s.score).collect();
        let selection = self.method.apply(&values, &self.config)?;

        Ok(Verdict {
            id: Verdict::id_for(&self.name),
            winner_answer: answers[selection.index].clone(),
            aggregate_score: selection.aggregate,
            requires_human_review: false,
        })
    }

    fn run(&self, state: &State) -> Result<State, UnitError> {
        let answers = state
            .require_list(keys::ANSWERS)
            .in_unit(&self.name, "reading inputs")?;
        let scores = state
            .require_list(keys::JUDGE_SCORES)
            .in_unit(&self.name, "reading inputs")?;

        let span = tracing::info_span!(
            "aggregate",
            unit = %self.name,
            method = ?self.method,
            tie_breaker = ?self.config.tie_breaker,
            min_score = self.config.min_score,
            answers = answers.len(),
            scores = scores.len(),
            aggregate_score = Empty,
            latency_us = Empty,
            no_llm_cost = true,
        );
        let _enter = span.enter();

        let started = Instant::now();
        let verdict = self
            .decide(answers, scores)
            .in_unit(&self.name, "aggregating scores")?;
        span.record("aggregate_score", verdict.aggregate_score);
        span.record("latency_us", started.elapsed().as_micros() as u64);

        Ok(state.with(keys::VERDICT, verdict))
    }
}

#[async_trait]
impl Unit for Aggregator {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> UnitKind {
        self.method.unit_kind()
    }

    async fn execute(&self, ctx: &Context, state: &State) -> Result<State, UnitError> {
        if let Some(err) = ctx.err() {
            return Err(UnitError::new(&self.name, "aggregating scores", err.into()));
        }
        self.run(state)
    }

    fn validate(&self) -> Result<(), UnitError> {
        config::validate_name(&self.name).in_unit(&self.name, "validating configuration")?;
        self.config
            .validate()
            .in_unit(&self.name, "validating configuration")
    }

    fn reconfigure(&self, options: &Options) -> Result<Box<dyn Unit>, UnitError> {
        let config =
            config::from_options(&self.config, options).in_unit(&self.name, "reconfiguring")?;
        Ok(Box::new(Self::new(self.name.clone(), self.method, config)?))
    }
}
