//! Sequential composition of units.
//!
//! A pipeline runs its units in order, threading each unit's output state
//! into the next. The first failure stops the run; the caller's state is
//! never modified.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tribunal_core::{Context, State, Unit, UnitError};

use crate::providers::LlmProvider;
use crate::registry::{build_unit, validate_spec, UnitSpec};

/// Errors from loading or running a pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to read pipeline file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid pipeline file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("pipeline '{0}' has no units")]
    Empty(String),

    #[error(transparent)]
    Unit(#[from] UnitError),
}

/// A pipeline as written in a YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSpec {
    /// Pipeline name, used in logs and reports
    pub name: String,

    /// Units in execution order
    pub units: Vec<UnitSpec>,
}

impl PipelineSpec {
    pub fn from_yaml(yaml: &str) -> Result<Self, PipelineError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Check every unit's configuration; no provider needed.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.units.is_empty() {
            return Err(PipelineError::Empty(self.name.clone()));
        }
        for unit in &self.units {
            validate_spec(unit)?;
        }
        Ok(())
    }
}

/// An ordered list of ready-to-run units.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    units: Vec<Box<dyn Unit>>,
}

impl Pipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            units: Vec::new(),
        }
    }

    /// Build every unit in `spec`, sharing `provider` among model-backed ones.
    pub fn from_spec(
        spec: &PipelineSpec,
        provider: Option<Arc<dyn LlmProvider>>,
    ) -> Result<Self, PipelineError> {
        let mut builder = Self::builder(&spec.name);
        for unit in &spec.units {
            builder = builder.unit(build_unit(unit, provider.clone())?);
        }
        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> impl Iterator<Item = &dyn Unit> {
        self.units.iter().map(|u| u.as_ref())
    }

    /// Run every unit in order.
    pub async fn run(&self, ctx: &Context, state: &State) -> Result<State, UnitError> {
        let started = Instant::now();
        let mut current = state.clone();
        for unit in &self.units {
            tracing::info!(pipeline = %self.name, unit = %unit.name(), kind = %unit.kind(), "running unit");
            current = unit.execute(ctx, &current).await.inspect_err(|e| {
                tracing::warn!(pipeline = %self.name, unit = %unit.name(), error = %e, "unit failed");
            })?;
        }
        tracing::info!(
            pipeline = %self.name,
            units = self.units.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "pipeline complete"
        );
        Ok(current)
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    name: String,
    units: Vec<Box<dyn Unit>>,
}

impl PipelineBuilder {
    pub fn unit(mut self, unit: Box<dyn Unit>) -> Self {
        self.units.push(unit);
        self
    }

    pub fn build(self) -> Result<Pipeline, PipelineError> {
        if self.units.is_empty() {
            return Err(PipelineError::Empty(self.name));
        }
        Ok(Pipeline {
            name: self.name,
            units: self.units,
        })
    }
}
