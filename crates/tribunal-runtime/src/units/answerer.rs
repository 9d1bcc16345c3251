use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::field::Empty;
use tracing::Instrument;
use tribunal_core::config::{self, check_range, duration, lenient};
use tribunal_core::{
    keys, Answer, Context, EvalError, Options, PromptTemplate, ResultExt, State, Unit, UnitConfig,
    UnitError, UnitKind,
};

use crate::fanout::fan_out;
use crate::prompts::DEFAULT_ANSWERER_PROMPT;
use crate::providers::{CompletionOptions, LlmProvider};

use super::{check_content_size, fold_budget, total_tokens, DEFAULT_MAX_CONCURRENCY};

/// Configuration for [`Answerer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnswererConfig {
    /// How many candidates to generate, 1 - 10
    #[serde(deserialize_with = "lenient::deserialize")]
    pub num_answers: usize,

    /// Handlebars template; must reference `{{question}}`
    pub prompt: String,

    /// Sampling temperature (0.0 - 1.0)
    #[serde(deserialize_with = "lenient::deserialize")]
    pub temperature: f64,

    /// Maximum tokens per answer (10 - 16000)
    #[serde(deserialize_with = "lenient::deserialize")]
    pub max_tokens: u32,

    /// Deadline for the whole batch
    #[serde(with = "duration")]
    pub timeout: Duration,

    /// Model calls in flight at once (1 - 20)
    #[serde(deserialize_with = "lenient::deserialize")]
    pub max_concurrency: usize,
}

impl Default for AnswererConfig {
    fn default() -> Self {
        Self {
            num_answers: 3,
            prompt: DEFAULT_ANSWERER_PROMPT.to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout: Duration::from_secs(30),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl AnswererConfig {
    fn template(&self) -> Result<PromptTemplate, EvalError> {
        if self.prompt.chars().count() < 10 {
            return Err(EvalError::invalid_config(
                "prompt must be at least 10 characters",
            ));
        }
        let template = PromptTemplate::parse(&self.prompt)?;
        template.require_references("prompt", &["question"])?;
        Ok(template)
    }
}

impl UnitConfig for AnswererConfig {
    fn validate(&self) -> Result<(), EvalError> {
        check_range("num_answers", self.num_answers, 1, 10)?;
        check_range("temperature", self.temperature, 0.0, 1.0)?;
        check_range("max_tokens", self.max_tokens, 10, 16_000)?;
        if self.timeout < Duration::from_secs(1) || self.timeout > Duration::from_secs(300) {
            return Err(EvalError::invalid_config(format!(
                "timeout must be between 1s and 300s, got {:?}",
                self.timeout
            )));
        }
        check_range("max_concurrency", self.max_concurrency, 1, 20)?;
        self.template().map(|_| ())
    }
}

/// Generates `num_answers` candidate answers to the state's question.
///
/// The prompt is rendered once and sent `num_answers` times, with at most
/// `max_concurrency` calls in flight. The batch fails on the first error.
pub struct Answerer {
    name: String,
    config: AnswererConfig,
    template: PromptTemplate,
    provider: Arc<dyn LlmProvider>,
}

impl std::fmt::Debug for Answerer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Answerer")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("model", &self.provider.model())
            .finish()
    }
}

impl Answerer {
    pub fn new(
        name: impl Into<String>,
        config: AnswererConfig,
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
        let config = config::from_options(&AnswererConfig::default(), options)
            .in_unit(&name, "parsing configuration")?;
        Self::new(name, config, provider)
    }

    pub fn config(&self) -> &AnswererConfig {
        &self.config
    }

    async fn run(&self, ctx: &Context, state: &State) -> Result<State, UnitError> {
        let question = state
            .require_text(keys::QUESTION)
            .in_unit(&self.name, "reading inputs")?;
        let prompt = self
            .template
            .render(&json!({ "question": question }))
            .in_unit(&self.name, "rendering prompt")?;

        let span = tracing::info_span!(
            "answerer",
            unit = %self.name,
            model = %self.provider.model(),
            num_answers = self.config.num_answers,
            max_concurrency = self.config.max_concurrency,
            tokens = Empty,
            latency_us = Empty,
        );

        let started = Instant::now();
        let batch_ctx = ctx.with_timeout(self.config.timeout);
        let options = CompletionOptions::new(self.config.temperature, self.config.max_tokens);
        let provider = &self.provider;
        let (prompt, options, batch_ctx) = (&prompt, &options, &batch_ctx);

        let completions = fan_out(
            batch_ctx,
            self.config.num_answers,
            self.config.max_concurrency,
            |_| async move {
                let completion = provider
                    .complete_with_usage(batch_ctx, prompt, options)
                    .await?;
                check_content_size("answer", &completion.text)?;
                Ok::<_, EvalError>(completion)
            },
        )
        .instrument(span.clone())
        .await
        .in_unit(&self.name, "generating answers")?;

        let tokens = total_tokens(&completions);
        span.record("tokens", tokens);
        span.record("latency_us", started.elapsed().as_micros() as u64);

        let calls = completions.len() as u64;
        let answers: Vec<Answer> = completions
            .into_iter()
            .enumerate()
            .map(|(i, completion)| Answer::new(Answer::id_for(&self.name, i), completion.text))
            .collect();

        fold_budget(state.with(keys::ANSWERS, answers), tokens, calls)
            .in_unit(&self.name, "updating budget")
    }
}

#[async_trait]
impl Unit for Answerer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Answerer
    }

    async fn execute(&self, ctx: &Context, state: &State) -> Result<State, UnitError> {
        if let Some(err) = ctx.err() {
            return Err(UnitError::new(&self.name, "generating answers", err.into()));
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
