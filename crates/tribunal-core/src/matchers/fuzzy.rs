use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::field::Empty;

use crate::config::{self, lenient, Options, UnitConfig};
use crate::context::Context;
use crate::error::{EvalError, ResultExt, UnitError};
use crate::state::{keys, State};
use crate::types::{Answer, JudgeSummary};
use crate::unit::{Unit, UnitKind};

use super::{average, check_inputs, normalize, similarity};

/// Supported edit-distance algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FuzzyAlgorithm {
    #[default]
    Levenshtein,
}

/// Configuration for [`FuzzyMatcher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FuzzyMatchConfig {
    /// Similarity measure; only Levenshtein is supported
    pub algorithm: FuzzyAlgorithm,

    /// Similarities below this snap to 0.0
    #[serde(deserialize_with = "lenient::deserialize")]
    pub threshold: f64,

    /// Compare without case folding
    pub case_sensitive: bool,
}

impl Default for FuzzyMatchConfig {
    fn default() -> Self {
        Self {
            algorithm: FuzzyAlgorithm::Levenshtein,
            threshold: 0.8,
            case_sensitive: false,
        }
    }
}

impl UnitConfig for FuzzyMatchConfig {
    fn validate(&self) -> Result<(), EvalError> {
        config::check_range("threshold", self.threshold, 0.0, 1.0)
    }
}

/// Scores answers by normalized edit-distance similarity to the reference.
#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    name: String,
    config: FuzzyMatchConfig,
}

impl FuzzyMatcher {
    pub fn new(name: impl Into<String>, config: FuzzyMatchConfig) -> Result<Self, UnitError> {
        let name = name.into();
        config::validate_name(&name).in_unit(&name, "validating configuration")?;
        config.validate().in_unit(&name, "validating configuration")?;
        Ok(Self { name, config })
    }

    pub fn from_options(name: impl Into<String>, options: &Options) -> Result<Self, UnitError> {
        let name = name.into();
        let config = config::from_options(&FuzzyMatchConfig::default(), options)
            .in_unit(&name, "parsing configuration")?;
        Self::new(name, config)
    }

    pub fn config(&self) -> &FuzzyMatchConfig {
        &self.config
    }

    pub fn score(&self, reference: &str, answers: &[Answer]) -> Result<Vec<JudgeSummary>, EvalError> {
        check_inputs(reference, answers)?;

        let case_sensitive = self.config.case_sensitive;
        let threshold = self.config.threshold;
        let expected = normalize(reference, false, case_sensitive);

        Ok(answers
            .iter()
            .map(|answer| {
                let candidate = normalize(&answer.content, false, case_sensitive);
                let raw = match self.config.algorithm {
                    FuzzyAlgorithm::Levenshtein => similarity(&expected, &candidate),
                };
                let score = if raw < threshold { 0.0 } else { raw };
                JudgeSummary::deterministic(
                    score,
                    format!(
                        "Levenshtein similarity {:.3} (threshold {:.3})",
                        raw, threshold
                    ),
                )
            })
            .collect())
    }

    fn run(&self, state: &State) -> Result<State, UnitError> {
        let reference = state
            .require_text(keys::REFERENCE_ANSWER)
            .in_unit(&self.name, "reading inputs")?;
        let answers = state
            .require_list(keys::ANSWERS)
            .in_unit(&self.name, "reading inputs")?;

        let span = tracing::info_span!(
            "fuzzy_match",
            unit = %self.name,
            algorithm = ?self.config.algorithm,
            threshold = self.config.threshold,
            case_sensitive = self.config.case_sensitive,
            answers = answers.len(),
            avg_score = Empty,
            latency_us = Empty,
            no_llm_cost = true,
        );
        let _enter = span.enter();

        let started = Instant::now();
        let scores = self
            .score(reference, answers)
            .in_unit(&self.name, "matching answers")?;

        let values: Vec<f64> = scores.iter().map(|s| s.score).collect();
        span.record("avg_score", average(&values));
        span.record("latency_us", started.elapsed().as_micros() as u64);

        Ok(state.with(keys::JUDGE_SCORES, scores))
    }
}

#[async_trait]
impl Unit for FuzzyMatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> UnitKind {
        UnitKind::FuzzyMatch
    }

    async fn execute(&self, ctx: &Context, state: &State) -> Result<State, UnitError> {
        if let Some(err) = ctx.err() {
            return Err(UnitError::new(&self.name, "matching answers", err.into()));
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
        Ok(Box::new(Self::new(self.name.clone(), config)?))
    }
}
