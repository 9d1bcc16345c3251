//! # tribunal-core
//!
//! Deterministic building blocks for evaluation pipelines.
//!
//! A pipeline is a sequence of [`Unit`]s that read from and write to an
//! immutable [`State`]. This crate holds everything that never calls a
//! language model:
//!
//! - the state container and its well-known [`keys`]
//! - the unit contract, cancellation [`Context`] and error taxonomy
//! - config normalization, prompt templates, JSON extraction, score scales
//! - exact and fuzzy [`matchers`]
//! - max, mean and median [`aggregators`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use tribunal_core::{keys, Answer, Context, ExactMatcher, ExactMatchConfig, State, Unit};
//!
//! let matcher = ExactMatcher::new("exact", ExactMatchConfig::default())?;
//! let state = State::new()
//!     .with(keys::REFERENCE_ANSWER, "Paris".to_string())
//!     .with(keys::ANSWERS, vec![Answer::new("a1", "paris")]);
//! let state = matcher.execute(&Context::background(), &state).await?;
//! assert_eq!(state.require(keys::JUDGE_SCORES)?[0].score, 1.0);
//! ```

pub mod aggregators;
pub mod config;
pub mod context;
pub mod error;
pub mod json;
pub mod matchers;
pub mod scale;
pub mod state;
pub mod template;
pub mod types;
pub mod unit;

pub use aggregators::{Aggregator, AggregatorConfig, Method, MinScoreBasis, Selection, TieBreaker};
pub use config::{from_options, Options, UnitConfig};
pub use context::{CancelHandle, Context, ContextError};
pub use error::{EvalError, ResultExt, UnitError};
pub use json::extract_json;
pub use matchers::{ExactMatchConfig, ExactMatcher, FuzzyAlgorithm, FuzzyMatchConfig, FuzzyMatcher};
pub use scale::ScoreScale;
pub use state::{keys, Key, State, StateError};
pub use template::PromptTemplate;
pub use types::{Answer, BudgetReport, JudgeSummary, Verdict, MAX_ANSWERS, MAX_CONTENT_BYTES};
pub use unit::{Unit, UnitKind};
