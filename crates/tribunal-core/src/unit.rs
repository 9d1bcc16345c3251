//! The unit contract shared by every pipeline stage.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Options;
use crate::context::Context;
use crate::error::{EvalError, UnitError};
use crate::state::State;

/// The closed set of unit kinds a pipeline may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Answerer,
    ScoreJudge,
    ExactMatch,
    FuzzyMatch,
    MaxPool,
    #[serde(alias = "arithmetic_mean")]
    MeanPool,
    MedianPool,
    Verifier,
}

impl UnitKind {
    pub const ALL: [UnitKind; 8] = [
        UnitKind::Answerer,
        UnitKind::ScoreJudge,
        UnitKind::ExactMatch,
        UnitKind::FuzzyMatch,
        UnitKind::MaxPool,
        UnitKind::MeanPool,
        UnitKind::MedianPool,
        UnitKind::Verifier,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Answerer => "answerer",
            UnitKind::ScoreJudge => "score_judge",
            UnitKind::ExactMatch => "exact_match",
            UnitKind::FuzzyMatch => "fuzzy_match",
            UnitKind::MaxPool => "max_pool",
            UnitKind::MeanPool => "mean_pool",
            UnitKind::MedianPool => "median_pool",
            UnitKind::Verifier => "verifier",
        }
    }

    /// Whether executing this kind calls a language model.
    pub fn is_model_backed(&self) -> bool {
        matches!(
            self,
            UnitKind::Answerer | UnitKind::ScoreJudge | UnitKind::Verifier
        )
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitKind {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        if normalized == "arithmetic_mean" {
            return Ok(UnitKind::MeanPool);
        }
        UnitKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| EvalError::invalid_config(format!("unknown unit kind '{}'", s)))
    }
}

/// A pipeline stage.
///
/// `execute` must not mutate `self` or the input state: it returns a new
/// state carrying the unit's output, or an error with the input left as is.
/// `reconfigure` builds a fresh unit and leaves `self` untouched.
#[async_trait]
pub trait Unit: Send + Sync + fmt::Debug {
    /// Stable identifier, also used to derive output ids.
    fn name(&self) -> &str;

    fn kind(&self) -> UnitKind;

    async fn execute(&self, ctx: &Context, state: &State) -> Result<State, UnitError>;

    /// Re-check the unit's configuration.
    fn validate(&self) -> Result<(), UnitError>;

    /// Build a new unit of the same kind with `options` merged over the current configuration.
    fn reconfigure(&self, options: &Options) -> Result<Box<dyn Unit>, UnitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_names() {
        for kind in UnitKind::ALL {
            assert_eq!(kind.as_str().parse::<UnitKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_arithmetic_mean_alias() {
        assert_eq!(
            "arithmetic_mean".parse::<UnitKind>().unwrap(),
            UnitKind::MeanPool
        );
        let kind: UnitKind = serde_yaml::from_str("arithmetic_mean").unwrap();
        assert_eq!(kind, UnitKind::MeanPool);
    }

    #[test]
    fn test_unknown_kind() {
        let err = "geometric_mean".parse::<UnitKind>().unwrap_err();
        assert!(err.to_string().contains("unknown unit kind"));
    }

    #[test]
    fn test_model_backed_kinds() {
        assert!(UnitKind::Answerer.is_model_backed());
        assert!(UnitKind::Verifier.is_model_backed());
        assert!(!UnitKind::FuzzyMatch.is_model_backed());
        assert!(!UnitKind::MedianPool.is_model_backed());
    }
}
