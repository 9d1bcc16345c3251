use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::field::Empty;
use tracing::Instrument;
use tribunal_core::config::{self, check_range, lenient};
use tribunal_core::{
    keys, Context, EvalError, JudgeSummary, Options, PromptTemplate, ResultExt, ScoreScale, State,
    Unit, UnitConfig, UnitError, UnitKind,
};

use crate::fanout::fan_out;
use crate::patterns::supports_json_mode;
use crate::prompts::{DEFAULT_JUDGE_PROMPT, JUDGE_JSON_INSTRUCTION};
use crate::providers::{CompletionOptions, LlmProvider};
use crate::response::parse_judge_response;

use super::{fold_budget, total_tokens, DEFAULT_MAX_CONCURRENCY};

/// Configuration for [`ScoreJudge`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoreJudgeConfig {
    /// Handlebars template; must reference `{{question}}` and `{{answer}}`
    pub judge_prompt: String,

    /// Written as `"min-max"`, e.g. `"1-10"` or `"-5-5"`
    pub score_scale: ScoreScale,

    /// Sampling temperature (0.0 - 1.0)
    #[serde(deserialize_with = "lenient::deserialize")]
    pub temperature: f64,

    /// Maximum tokens per judgement (50 - 2000)
    #[serde(deserialize_with = "lenient::deserialize")]
    pub max_tokens: u32,

    /// Responses less confident than this fail the batch
    #[serde(deserialize_with = "lenient::deserialize")]
    pub min_confidence: f64,

    /// Model calls in flight at once (1 - 20)
    #[serde(deserialize_with = "lenient::deserialize")]
    pub max_concurrency: usize,
}

impl Default for ScoreJudgeConfig {
    fn default() -> Self {
        Self {
            judge_prompt: DEFAULT_JUDGE_PROMPT.to_string(),
            score_scale: ScoreScale::default(),
            temperature: 0.0,
            max_tokens: 500,
            min_confidence: 0.0,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl ScoreJudgeConfig {
    fn template(&self) -> Result<PromptTemplate, EvalError> {
        if self.judge_prompt.chars().count() < 20 {
            return Err(EvalError::invalid_config(
                "judge_prompt must be at least 20 characters",
            ));
        }
        let template = PromptTemplate::parse(&self.judge_prompt)?;
        template.require_references("judge_prompt", &["question", "answer"])?;
        Ok(template)
    }
}

impl UnitConfig for ScoreJudgeConfig {
    fn validate(&self) -> Result<(), EvalError> {
        check_range("temperature", self.temperature, 0.0, 1.0)?;
        check_range("max_tokens", self.max_tokens, 50, 2_000)?;
        check_range("min_confidence", self.min_confidence, 0.0, 1.0)?;
        check_range("max_concurrency", self.max_concurrency, 1, 20)?;
        self.template().map(|_| ())
    }
}

/// Scores every candidate answer with one model call each.
pub struct ScoreJudge {
    name: String,
    config: ScoreJudgeConfig,
    template: PromptTemplate,
    provider: Arc<dyn LlmProvider>,
}

impl std::fmt::Debug for ScoreJudge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreJudge")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("model", &self.provider.model())
            .finish()
    }
}

impl ScoreJudge {
    pub fn new(
        name: impl Into<String>,
        config: ScoreJudgeConfig,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<Self, UnitError> {
        let name = name.into();
        config::validate_name(&name).in_unit(&name, "validating configuration")?;
        config.validate().in_unit(&name, "validating configuration")?;
        let template = config.template().in_unit(&name, "parsing prompt")?;
        Ok(Self {
            name,
            config,
            template,
            provider,
        })
    }

    pub fn from_options(
        name: impl Into<String>,
        options: &Options,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<Self, UnitError> {
        let name = name.into();
        let config = config::from_options(&ScoreJudgeConfig::default(), options)
            .in_unit(&name, "parsing configuration")?;
        Self::new(name, config, provider)
    }

    pub fn config(&self) -> &ScoreJudgeConfig {
        &self.config
    }

    fn completion_options(&self) -> CompletionOptions {
        let options = CompletionOptions::new(self.config.temperature, self.config.max_tokens);
        if supports_json_mode(self.provider.model()) {
            options.json()
        } else {
            options
        }
    }

    async fn run(&self, ctx: &Context, state: &State) -> Result<State, UnitError> {
        let question = state
            .require_text(keys::QUESTION)
            .in_unit(&self.name, "reading inputs")?;
        let answers = state
            .require_list(keys::ANSWERS)
            .in_unit(&self.name, "reading inputs")?;

        let scale = self.config.score_scale;
        let prompts = answers
            .iter()
            .map(|answer| {
                let body = self.template.render(&json!({
                    "question": question,
                    "answer": answer.content,
                    "answer_id": answer.id,
                    "scale_min": scale.min().to_string(),
                    "scale_max": scale.max().to_string(),
                }))?;
                Ok(format!("{}\n\n{}", body, JUDGE_JSON_INSTRUCTION))
            })
            .collect::<Result<Vec<String>, EvalError>>()
            .in_unit(&self.name, "rendering prompt")?;

        let span = tracing::info_span!(
            "score_judge",
            unit = %self.name,
            model = %self.provider.model(),
            score_scale = %scale,
            answers = answers.len(),
            avg_score = Empty,
            tokens = Empty,
            latency_us = Empty,
        );

        let started = Instant::now();
        let options = self.completion_options();
        let provider = &self.provider;
        let (prompts, options, min_confidence) = (&prompts, &options, self.config.min_confidence);

        let judged = fan_out(ctx, prompts.len(), self.config.max_concurrency, |i| async move {
            let completion = provider
                .complete_with_usage(ctx, &prompts[i], options)
                .await?;
            let summary = parse_judge_response(&completion.text, &scale, min_confidence)
                .inspect_err(|e| tracing::warn!(answer = i, error = %e, "judge response rejected"))?;
            Ok::<_, EvalError>((summary, completion))
        })
        .instrument(span.clone())
        .await
        .in_unit(&self.name, "judging answers")?;

        let tokens = total_tokens(judged.iter().map(|(_, c)| c));
        let calls = judged.len() as u64;
        let scores: Vec<JudgeSummary> = judged.into_iter().map(|(s, _)| s).collect();

        let avg = scores.iter().map(|s| s.score).sum::<f64>() / scores.len() as f64;
        span.record("avg_score", avg);
        span.record("tokens", tokens);
        span.record("latency_us", started.elapsed().as_micros() as u64);

        fold_budget(state.with(keys::JUDGE_SCORES, scores), tokens, calls)
            .in_unit(&self.name, "updating budget")
    }
}

#[async_trait]
impl Unit for ScoreJudge {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> UnitKind {
        UnitKind::ScoreJudge
    }

    async fn execute(&self, ctx: &Context, state: &State) -> Result<State, UnitError> {
        if let Some(err) = ctx.err() {
            return Err(UnitError::new(&self.name, "judging answers", err.into()));
        }
        self.run(ctx, state).await
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
        Ok(Box::new(Self::new(
            self.name.clone(),
            config,
            Arc::clone(&self.provider),
        )?))
    }
}
