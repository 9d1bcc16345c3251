use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::field::Empty;
use tracing::Instrument;
use tribunal_core::config::{self, check_range, lenient};
use tribunal_core::{
    keys, Answer, Context, EvalError, JudgeSummary, Options, PromptTemplate, ResultExt, State,
    Unit, UnitConfig, UnitError, UnitKind, Verdict,
};

use crate::patterns::supports_json_mode;
use crate::prompts::DEFAULT_VERIFIER_PROMPT;
use crate::providers::{CompletionOptions, LlmProvider};
use crate::resilience::{estimate_tokens, ContextBudget, RetryPolicy};
use crate::response::{parse_verification, VerificationResult};
use crate::sanitize::sanitize;

use super::fold_budget;

/// Configuration for [`Verifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifierConfig {
    /// Must reference `{{question}}`, `{{answers}}` and `{{judge_scores}}`
    pub prompt_template: String,

    /// Verifier confidence below this flags the verdict for human review
    #[serde(deserialize_with = "lenient::deserialize")]
    pub confidence_threshold: f64,

    /// Sampling temperature (0.0 - 1.0)
    #[serde(deserialize_with = "lenient::deserialize")]
    pub temperature: f64,

    /// Maximum tokens for the critique (50 - 2000)
    #[serde(deserialize_with = "lenient::deserialize")]
    pub max_tokens: u32,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            prompt_template: DEFAULT_VERIFIER_PROMPT.to_string(),
            confidence_threshold: 0.7,
            temperature: 0.0,
            max_tokens: 500,
        }
    }
}

impl VerifierConfig {
    fn template(&self) -> Result<PromptTemplate, EvalError> {
        if self.prompt_template.chars().count() < 20 {
            return Err(EvalError::invalid_config(
                "prompt_template must be at least 20 characters",
            ));
        }
        let template = PromptTemplate::parse(&self.prompt_template)?;
        template.require_references("prompt_template", &["question", "answers", "judge_scores"])?;
        Ok(template)
    }
}

impl UnitConfig for VerifierConfig {
    fn validate(&self) -> Result<(), EvalError> {
        check_range("confidence_threshold", self.confidence_threshold, 0.0, 1.0)?;
        check_range("temperature", self.temperature, 0.0, 1.0)?;
        check_range("max_tokens", self.max_tokens, 50, 2_000)?;
        self.template().map(|_| ())
    }
}

/// Critiques the aggregate verdict with one model call.
///
/// The call goes through [`RetryPolicy`]. Every user-originating string is
/// fenced with [`sanitize`] before rendering, and answers are truncated to
/// fit the model's context window. The verdict comes back with
/// `requires_human_review` set from the verifier's confidence.
pub struct Verifier {
    name: String,
    config: VerifierConfig,
    template: PromptTemplate,
    provider: Arc<dyn LlmProvider>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("model", &self.provider.model())
            .field("retry", &self.retry)
            .finish()
    }
}

struct Inputs<'a> {
    question: &'a str,
    answers: &'a [Answer],
    scores: &'a [JudgeSummary],
    verdict: &'a Verdict,
}

impl Verifier {
    pub fn new(
        name: impl Into<String>,
        config: VerifierConfig,
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
            retry: RetryPolicy::default(),
        })
    }

    pub fn from_options(
        name: impl Into<String>,
        options: &Options,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<Self, UnitError> {
        let name = name.into();
        let config = config::from_options(&VerifierConfig::default(), options)
            .in_unit(&name, "parsing configuration")?;
        Self::new(name, config, provider)
    }

    /// Replace the default retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &VerifierConfig {
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

    fn read_inputs<'a>(&self, state: &'a State) -> Result<Inputs<'a>, EvalError> {
        Ok(Inputs {
            question: state.require_text(keys::QUESTION)?,
            answers: state.require_list(keys::ANSWERS)?,
            scores: state.require_list(keys::JUDGE_SCORES)?,
            verdict: state.require(keys::VERDICT)?,
        })
    }

    /// Render the prompt with sanitized inputs, truncating answers to fit.
    fn build_prompt(&self, inputs: &Inputs<'_>) -> Result<String, EvalError> {
        let budget = ContextBudget::for_model(self.provider.model());
        let question = sanitize(inputs.question);

        let scores: Vec<Value> = inputs
            .scores
            .iter()
            .enumerate()
            .map(|(i, score)| {
                json!({
                    "answer_id": inputs.answers.get(i).map(|a| a.id.as_str()).unwrap_or_default(),
                    "score": score.score,
                    "confidence": score.confidence,
                    "reasoning": sanitize(&score.reasoning),
                })
            })
            .collect();
        let score_tokens: usize = scores
            .iter()
            .map(|s| estimate_tokens(&s.to_string()))
            .sum();

        let contents: Vec<String> = inputs.answers.iter().map(|a| a.content.clone()).collect();
        let available = budget.available_for_answers(estimate_tokens(&question), score_tokens);
        let fitted = budget.fit_answers(&contents, available);
        let answers: Vec<Value> = inputs
            .answers
            .iter()
            .zip(&fitted)
            .map(|(answer, content)| json!({ "id": answer.id, "content": sanitize(content) }))
            .collect();

        let prompt = self.template.render(&json!({
            "question": question,
            "answers": answers,
            "judge_scores": scores,
            "verdict": {
                "id": inputs.verdict.id,
                "winner_id": inputs.verdict.winner_answer.id,
                "aggregate_score": inputs.verdict.aggregate_score,
            },
        }))?;
        budget.check_prompt(&prompt)?;
        Ok(prompt)
    }

    async fn run(&self, ctx: &Context, state: &State) -> Result<State, UnitError> {
        let inputs = self
            .read_inputs(state)
            .in_unit(&self.name, "reading inputs")?;
        let prompt = self
            .build_prompt(&inputs)
            .in_unit(&self.name, "building prompt")?;

        let span = tracing::info_span!(
            "verifier",
            unit = %self.name,
            model = %self.provider.model(),
            answers = inputs.answers.len(),
            confidence_threshold = self.config.confidence_threshold,
            confidence = Empty,
            requires_human_review = Empty,
            tokens_in = Empty,
            tokens_out = Empty,
            latency_us = Empty,
            no_llm_cost = false,
        );

        let started = Instant::now();
        let options = self.completion_options();
        let provider = &self.provider;
        let (prompt, options) = (&prompt, &options);

        let completion = self
            .retry
            .call(ctx, |attempt| async move {
                if attempt > 0 {
                    tracing::debug!(attempt, "retrying verification call");
                }
                provider.complete_with_usage(ctx, prompt, options).await
            })
            .instrument(span.clone())
            .await
            .in_unit(&self.name, "calling model")?;

        let result = parse_verification(&completion.text)
            .inspect_err(|e| tracing::warn!(unit = %self.name, error = %e, "verification response rejected"))
            .in_unit(&self.name, "validating response")?;

        let mut verdict = inputs.verdict.clone();
        verdict.requires_human_review = result.confidence < self.config.confidence_threshold;

        span.record("confidence", result.confidence);
        span.record("requires_human_review", verdict.requires_human_review);
        span.record("tokens_in", completion.tokens_in);
        span.record("tokens_out", completion.tokens_out);
        span.record("latency_us", started.elapsed().as_micros() as u64);

        let mut next = state.with(keys::VERDICT, verdict);
        if trace_enabled(state).in_unit(&self.name, "reading inputs")? {
            next = next.with(
                keys::VERIFICATION_TRACE,
                trace_json(&result).in_unit(&self.name, "writing trace")?,
            );
        }
        fold_budget(next, completion.total_tokens(), 1).in_unit(&self.name, "updating budget")
    }
}

fn trace_enabled(state: &State) -> Result<bool, EvalError> {
    Ok(state
        .get(keys::TRACE_LEVEL)?
        .is_some_and(|level| level.trim().eq_ignore_ascii_case("debug")))
}

fn trace_json(result: &VerificationResult) -> Result<String, EvalError> {
    serde_json::to_string(result).map_err(|e| EvalError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl Unit for Verifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Verifier
    }

    async fn execute(&self, ctx: &Context, state: &State) -> Result<State, UnitError> {
        if let Some(err) = ctx.err() {
            return Err(UnitError::new(&self.name, "calling model", err.into()));
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
        let unit = Self::new(self.name.clone(), config, Arc::clone(&self.provider))?
            .with_retry_policy(self.retry.clone());
        Ok(Box::new(unit))
    }
}
