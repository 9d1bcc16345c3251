//! # tribunal-runtime
//!
//! Model-backed units and pipeline assembly for Tribunal.
//!
//! `tribunal-core` holds everything deterministic. This crate adds the
//! three units that call a language model, plus the machinery around
//! those calls:
//!
//! - [`Answerer`] generates candidate answers with bounded fan-out
//! - [`ScoreJudge`] scores each candidate and validates the JSON it gets back
//! - [`Verifier`] critiques the aggregate verdict, with retries and context budgeting
//! - [`Pipeline`] loads a YAML pipeline and runs its units in order
//!
//! Providers implement [`LlmProvider`]. [`ScriptedProvider`] replays canned
//! responses for tests and dry runs.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tribunal_core::{keys, Context, State};
//! use tribunal_runtime::{Pipeline, PipelineSpec, ScriptedProvider};
//!
//! let spec = PipelineSpec::from_file("pipeline.yaml")?;
//! let provider = Arc::new(ScriptedProvider::new("scripted", "Paris"));
//! let pipeline = Pipeline::from_spec(&spec, Some(provider))?;
//!
//! let state = State::new().with(keys::QUESTION, "What is the capital of France?".to_string());
//! let state = pipeline.run(&Context::background(), &state).await?;
//! println!("{:?}", state.require(keys::VERDICT)?);
//! ```

pub mod fanout;
pub mod patterns;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod registry;
pub mod resilience;
pub mod response;
pub mod sanitize;
pub mod units;

pub use fanout::fan_out;
pub use pipeline::{Pipeline, PipelineBuilder, PipelineError, PipelineSpec};
pub use providers::{
    Completion, CompletionOptions, LlmProvider, ProviderError, RecordedCall, ResponseFormat,
    ScriptedProvider,
};
pub use registry::{build_unit, validate_spec, UnitSpec};
pub use resilience::{ContextBudget, RetryPolicy};
pub use response::{parse_judge_response, parse_verification, VerificationResult};
pub use sanitize::sanitize;
pub use units::{
    Answerer, AnswererConfig, ScoreJudge, ScoreJudgeConfig, Verifier, VerifierConfig,
};
