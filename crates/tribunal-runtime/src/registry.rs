//! Building units from declarative specs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tribunal_core::{
    Aggregator, EvalError, ExactMatcher, FuzzyMatcher, Method, Options, ResultExt, Unit, UnitError,
    UnitKind,
};

use crate::providers::LlmProvider;
use crate::units::{
    Answerer, AnswererConfig, ScoreJudge, ScoreJudgeConfig, Verifier, VerifierConfig,
};

/// One unit as written in a pipeline file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitSpec {
    /// Unit type, e.g. `score_judge`
    pub kind: UnitKind,

    /// Unit name; prefixes produced ids
    pub name: String,

    /// Merged over the kind's default config
    #[serde(default)]
    pub options: Options,
}

impl UnitSpec {
    pub fn new(kind: UnitKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            options: Options::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<serde_yaml::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

fn require_provider(
    spec: &UnitSpec,
    provider: Option<Arc<dyn LlmProvider>>,
) -> Result<Arc<dyn LlmProvider>, UnitError> {
    provider.ok_or_else(|| {
        UnitError::new(
            &spec.name,
            "building unit",
            EvalError::invalid_config(format!("{} requires a model provider", spec.kind)),
        )
    })
}

/// Build a runnable unit from `spec`.
///
/// Model-backed kinds fail without a provider; the rest ignore it.
pub fn build_unit(
    spec: &UnitSpec,
    provider: Option<Arc<dyn LlmProvider>>,
) -> Result<Box<dyn Unit>, UnitError> {
    let name = spec.name.as_str();
    let options = &spec.options;
    Ok(match spec.kind {
        UnitKind::Answerer => Box::new(Answerer::from_options(
            name,
            options,
            require_provider(spec, provider)?,
        )?),
        UnitKind::ScoreJudge => Box::new(ScoreJudge::from_options(
            name,
            options,
            require_provider(spec, provider)?,
        )?),
        UnitKind::Verifier => Box::new(Verifier::from_options(
            name,
            options,
            require_provider(spec, provider)?,
        )?),
        UnitKind::ExactMatch => Box::new(ExactMatcher::from_options(name, options)?),
        UnitKind::FuzzyMatch => Box::new(FuzzyMatcher::from_options(name, options)?),
        kind => {
            let method = Method::from_kind(kind).ok_or_else(|| {
                UnitError::new(
                    name,
                    "building unit",
                    EvalError::invalid_config(format!("unsupported unit kind {}", kind)),
                )
            })?;
            Box::new(Aggregator::from_options(name, method, options)?)
        }
    })
}

/// Check `spec` without building it, so model-backed units need no provider.
pub fn validate_spec(spec: &UnitSpec) -> Result<(), UnitError> {
    let name = spec.name.as_str();
    tribunal_core::config::validate_name(name).in_unit(name, "validating configuration")?;
    match spec.kind {
        UnitKind::Answerer => parse::<AnswererConfig>(spec),
        UnitKind::ScoreJudge => parse::<ScoreJudgeConfig>(spec),
        UnitKind::Verifier => parse::<VerifierConfig>(spec),
        _ => build_unit(spec, None).map(|_| ()),
    }
}

fn parse<C: tribunal_core::UnitConfig>(spec: &UnitSpec) -> Result<(), UnitError> {
    tribunal_core::from_options(&C::default(), &spec.options)
        .map(|_| ())
        .in_unit(&spec.name, "parsing configuration")
}
