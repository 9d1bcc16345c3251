//! Error taxonomy for evaluation units.
//!
//! Pure functions (matchers, aggregators, parsers) return [`EvalError`].
//! Units wrap it in a [`UnitError`] that names the unit and the operation
//! that failed, so a message reads `<unit>: <operation>: <cause>`.

use thiserror::Error;

use crate::context::ContextError;
use crate::state::StateError;

/// What went wrong, independent of which unit hit it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("missing required input: {0}")]
    MissingInput(&'static str),

    #[error("input too large: {what} is {actual}, limit is {limit}")]
    InputTooLarge {
        what: String,
        actual: usize,
        limit: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("template parse failed: {0}")]
    TemplateParse(String),

    #[error("template execution failed: {0}")]
    TemplateExecution(String),

    #[error("model call failed: {message}")]
    Model { message: String, transient: bool },

    #[error("no JSON object found in model response")]
    NoJson,

    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    #[error("invalid score: {0} is not finite")]
    NonFiniteScore(f64),

    #[error("score {score} outside scale [{min}, {max}]")]
    ScoreOutOfScale { score: f64, min: f64, max: f64 },

    #[error("{measure} {value:.3} is below minimum score {min_score:.3}")]
    BelowMinimum {
        measure: &'static str,
        value: f64,
        min_score: f64,
    },

    #[error("score count mismatch: {answers} answers but {scores} scores")]
    ScoreCountMismatch { answers: usize, scores: usize },

    #[error("tie: {0}")]
    Tie(String),

    #[error("confidence {confidence:.3} below minimum {min_confidence:.3}")]
    LowConfidence {
        confidence: f64,
        min_confidence: f64,
    },

    #[error("prompt needs ~{estimated} tokens but model context limit is {limit}")]
    ContextTooLarge { estimated: usize, limit: usize },

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl EvalError {
    /// True when the error came from cancellation or an expired deadline.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, EvalError::Context(_))
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        EvalError::InvalidConfig(msg.into())
    }
}

/// An [`EvalError`] attributed to a unit and an operation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{unit}: {operation}: {source}")]
pub struct UnitError {
    /// Name of the failing unit
    pub unit: String,
    /// What the unit was doing, e.g. "judging answers"
    pub operation: &'static str,
    pub source: EvalError,
}

impl UnitError {
    pub fn new(unit: impl Into<String>, operation: &'static str, source: EvalError) -> Self {
        Self {
            unit: unit.into(),
            operation,
            source,
        }
    }

    /// The underlying cause.
    pub fn kind(&self) -> &EvalError {
        &self.source
    }

    pub fn is_cancellation(&self) -> bool {
        self.source.is_cancellation()
    }
}

/// Attach unit identity to a `Result<_, EvalError>`.
pub trait ResultExt<T> {
    fn in_unit(self, unit: &str, operation: &'static str) -> Result<T, UnitError>;
}

impl<T, E: Into<EvalError>> ResultExt<T> for Result<T, E> {
    fn in_unit(self, unit: &str, operation: &'static str) -> Result<T, UnitError> {
        self.map_err(|e| UnitError::new(unit, operation, e.into()))
    }
}
