use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::field::Empty;

use crate::config::{self, Options, UnitConfig};
use crate::context::Context;
use crate::error::{EvalError, ResultExt, UnitError};
use crate::state::{keys, State};
use crate::types::{Answer, JudgeSummary};
use crate::unit::{Unit, UnitKind};

use super::{average, check_inputs, normalize};

/// Configuration for [`ExactMatcher`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExactMatchConfig {
    /// Compare without case folding
    pub case_sensitive: bool,
    /// Trim both sides before comparing
    pub trim_whitespace: bool,
}

impl Default for ExactMatchConfig {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            trim_whitespace: true,
        }
    }
}

impl UnitConfig for ExactMatchConfig {
    fn validate(&self) -> Result<(), EvalError> {
        Ok(())
    }
}

/// Scores 1.0 when a normalized answer equals the normalized reference, else 0.0.
#[derive(Debug, Clone)]
pub struct ExactMatcher {
    name: String,
    config: ExactMatchConfig,
}

impl ExactMatcher {
    pub fn new(name: impl Into<String>, config: ExactMatchConfig) -> Result<Self, UnitError> {
        let name = name.into();
        config::validate_name(&name).in_unit(&name, "validating configuration")?;
        config.validate().in_unit(&name, "validating configuration")?;
        Ok(Self { name, config })
    }

    pub fn from_options(name: impl Into<String>, options: &Options) -> Result<Self, UnitError> {
        let name = name.into();
        let config = config::from_options(&ExactMatchConfig::default(), options)
            .in_unit(&name, "parsing configuration")?;
        Self::new(name, config)
    }

    pub fn config(&self) -> &ExactMatchConfig {
        &self.config
    }

    pub fn score(&self, reference: &str, answers: &[Answer]) -> Result<Vec<JudgeSummary>, EvalError> {
        check_inputs(reference, answers)?;

        let trim = self.config.trim_whitespace;
        let case_sensitive = self.config.case_sensitive;
        let expected = normalize(reference, trim, case_sensitive);

        Ok(answers
            .iter()
            .map(|answer| {
                if normalize(&answer.content, trim, case_sensitive) == expected {
                    JudgeSummary::deterministic(1.0, "Exact match found")
                } else {
                    JudgeSummary::deterministic(0.0, "No exact match")
                }
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
            "exact_match",
            unit = %self.name,
            case_sensitive = self.config.case_sensitive,
            trim_whitespace = self.config.trim_whitespace,
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
impl Unit for ExactMatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> UnitKind {
        UnitKind::ExactMatch
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

#[cfg(test)]
mod tests {
    use super::*;

    fn answers(contents: &[&str]) -> Vec<Answer> {
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| Answer::new(Answer::id_for("gen", i), *c))
            .collect()
    }

    fn scores_of(summaries: &[JudgeSummary]) -> Vec<f64> {
        summaries.iter().map(|s| s.score).collect()
    }

    #[test]
    fn test_default_folds_and_trims() {
        let matcher = ExactMatcher::new("exact", ExactMatchConfig::default()).unwrap();
        let out = matcher
            .score("Paris", &answers(&["  paris ", "PARIS", "Lyon"]))
            .unwrap();
        assert_eq!(scores_of(&out), vec![1.0, 1.0, 0.0]);
        assert_eq!(out[0].reasoning, "Exact match found");
        assert_eq!(out[2].reasoning, "No exact match");
        assert!(out.iter().all(|s| s.confidence == 1.0));
    }

    #[test]
    fn test_full_case_folding() {
        let matcher = ExactMatcher::new("exact", ExactMatchConfig::default()).unwrap();
        let out = matcher.score("straße", &answers(&["STRASSE"])).unwrap();
        assert_eq!(scores_of(&out), vec![1.0]);

        let out = matcher.score("\u{130}zmir", &answers(&["i\u{307}zmir"])).unwrap();
        assert_eq!(scores_of(&out), vec![1.0]);
    }

    #[test]
    fn test_case_sensitive_without_trim() {
        let config = ExactMatchConfig {
            case_sensitive: true,
            trim_whitespace: false,
        };
        let matcher = ExactMatcher::new("exact", config).unwrap();
        let out = matcher
            .score("Paris", &answers(&["Paris", "paris", " Paris"]))
            .unwrap();
        assert_eq!(scores_of(&out), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = ExactMatcher::new("", ExactMatchConfig::default()).unwrap_err();
        assert!(matches!(err.kind(), EvalError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_execute_writes_scores_and_keeps_input() {
        let matcher = ExactMatcher::new("exact", ExactMatchConfig::default()).unwrap();
        let input = State::new()
            .with(keys::REFERENCE_ANSWER, "4".to_string())
            .with(keys::ANSWERS, answers(&["4", "five"]));

        let output = matcher.execute(&Context::background(), &input).await.unwrap();
        let scores = output.get(keys::JUDGE_SCORES).unwrap().unwrap();
        assert_eq!(scores_of(scores), vec![1.0, 0.0]);
        assert!(input.get(keys::JUDGE_SCORES).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_execute_requires_reference() {
        let matcher = ExactMatcher::new("exact", ExactMatchConfig::default()).unwrap();
        let input = State::new().with(keys::ANSWERS, answers(&["4"]));
        let err = matcher
            .execute(&Context::background(), &input)
            .await
            .unwrap_err();
        assert_eq!(err.unit, "exact");
        assert_eq!(err.kind(), &EvalError::MissingInput("reference_answer"));
    }

    #[tokio::test]
    async fn test_repeated_runs_identical() {
        let matcher = ExactMatcher::new("exact", ExactMatchConfig::default()).unwrap();
        let input = State::new()
            .with(keys::REFERENCE_ANSWER, "Answer".to_string())
            .with(keys::ANSWERS, answers(&["answer", "other", "ANSWER "]));
        let first = matcher.execute(&Context::background(), &input).await.unwrap();
        let second = matcher.execute(&Context::background(), &input).await.unwrap();
        assert_eq!(
            first.get(keys::JUDGE_SCORES).unwrap(),
            second.get(keys::JUDGE_SCORES).unwrap()
        );
    }

    #[test]
    fn test_reconfigure_returns_new_unit() {
        let matcher = ExactMatcher::new("exact", ExactMatchConfig::default()).unwrap();
        let mut options = Options::new();
        options.insert("case_sensitive".into(), serde_yaml::Value::Bool(true));
        let updated = matcher.reconfigure(&options).unwrap();
        assert_eq!(updated.name(), "exact");
        assert_eq!(updated.kind(), UnitKind::ExactMatch);
        assert!(!matcher.config().case_sensitive);
    }
}
