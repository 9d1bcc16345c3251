//! Tribunal CLI
//!
//! ## Commands
//!
//! - `validate`: check every unit in a pipeline file
//! - `run`: run a pipeline over one case and print the report

mod case;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use tribunal_core::{keys, Answer, BudgetReport, Context, JudgeSummary, State, Verdict};
use tribunal_runtime::{Pipeline, PipelineSpec};

use crate::case::Case;

#[derive(Parser)]
#[command(name = "tribunal")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run evaluation pipelines over candidate answers", long_about = None)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a pipeline file without running it
    Validate {
        /// Pipeline definition (YAML)
        pipeline: PathBuf,
    },

    /// Run a pipeline over one case
    Run {
        /// Pipeline definition (YAML)
        pipeline: PathBuf,

        /// Case file (YAML or JSON)
        #[arg(short, long)]
        case: PathBuf,

        /// Report format
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

/// What `run` prints.
#[derive(Debug, Serialize)]
struct Report {
    pipeline: String,
    evaluated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    answers: Option<Vec<Answer>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    judge_scores: Option<Vec<JudgeSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    budget: Option<BudgetReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verification_trace: Option<serde_json::Value>,
}

impl Report {
    fn from_state(pipeline: &str, state: &State) -> Result<Self> {
        let verification_trace = state
            .get(keys::VERIFICATION_TRACE)?
            .map(|raw| serde_json::from_str(raw))
            .transpose()
            .context("decoding verification trace")?;
        Ok(Self {
            pipeline: pipeline.to_string(),
            evaluated_at: Utc::now(),
            answers: state.get(keys::ANSWERS)?.cloned(),
            judge_scores: state.get(keys::JUDGE_SCORES)?.cloned(),
            verdict: state.get(keys::VERDICT)?.cloned(),
            budget: state.get(keys::BUDGET)?.copied(),
            verification_trace,
        })
    }

    fn render(&self, format: Format) -> Result<String> {
        Ok(match format {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Yaml => serde_yaml::to_string(self)?,
        })
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_pipeline(path: &Path) -> Result<PipelineSpec> {
    PipelineSpec::from_file(path).with_context(|| format!("loading pipeline {}", path.display()))
}

fn validate(path: &Path) -> Result<()> {
    let spec = load_pipeline(path)?;
    spec.validate()
        .with_context(|| format!("pipeline '{}' is invalid", spec.name))?;
    println!("ok: {} ({} units)", spec.name, spec.units.len());
    Ok(())
}

async fn run(path: &Path, case: &Path, format: Format) -> Result<()> {
    let spec = load_pipeline(path)?;
    // No network providers ship with the CLI; model-backed units fail here.
    let pipeline = Pipeline::from_spec(&spec, None)
        .with_context(|| format!("building pipeline '{}'", spec.name))?;
    let state = Case::from_file(case)?.into_state();

    let (ctx, cancel) = Context::background().with_cancel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            cancel.cancel();
        }
    });

    let out = pipeline
        .run(&ctx, &state)
        .await
        .with_context(|| format!("running pipeline '{}'", pipeline.name()))?;
    let report = Report::from_state(pipeline.name(), &out)?;
    println!("{}", report.render(format)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Validate { pipeline } => validate(&pipeline),
        Commands::Run {
            pipeline,
            case,
            format,
        } => run(&pipeline, &case, format).await,
    }
}
