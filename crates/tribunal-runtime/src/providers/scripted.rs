//! Deterministic in-process provider.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tribunal_core::Context;

use super::{Completion, CompletionOptions, LlmProvider, ProviderError};

type Handler = dyn Fn(usize, &str) -> Result<String, ProviderError> + Send + Sync;

enum Script {
    /// Outcomes replayed in order, wrapping around
    Cycle(Vec<Result<String, ProviderError>>),
    /// Called with the 0-based call index and the prompt
    Handler(Arc<Handler>),
}

/// One call as seen by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub prompt: String,
    pub options: CompletionOptions,
}

/// A provider that replays scripted responses.
///
/// Reports usage as `prompt.len() / 4` in and `response.len() / 4` out unless
/// fixed usage is configured. Tracks the highest number of calls that were in
/// flight at once so tests can assert on concurrency bounds.
pub struct ScriptedProvider {
    model: String,
    script: Script,
    delay: Option<Duration>,
    usage: Option<(u64, u64)>,
    calls: Mutex<Vec<RecordedCall>>,
    next: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedProvider {
    /// A provider that always answers `response`.
    pub fn new(model: impl Into<String>, response: impl Into<String>) -> Self {
        Self::with_outcomes(model, vec![Ok(response.into())])
    }

    /// Responses replayed in order, cycling.
    pub fn with_responses<S: Into<String>>(model: impl Into<String>, responses: Vec<S>) -> Self {
        Self::with_outcomes(model, responses.into_iter().map(|r| Ok(r.into())).collect())
    }

    /// Successes and failures replayed in order, cycling.
    pub fn with_outcomes(
        model: impl Into<String>,
        outcomes: Vec<Result<String, ProviderError>>,
    ) -> Self {
        Self::build(model.into(), Script::Cycle(outcomes))
    }

    /// Answers computed per call.
    pub fn with_handler<F>(model: impl Into<String>, handler: F) -> Self
    where
        F: Fn(usize, &str) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self::build(model.into(), Script::Handler(Arc::new(handler)))
    }

    fn build(model: String, script: Script) -> Self {
        Self {
            model,
            script,
            delay: None,
            usage: None,
            calls: Mutex::new(Vec::new()),
            next: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Sleep this long before answering.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report fixed usage for every call.
    pub fn usage(mut self, tokens_in: u64, tokens_out: u64) -> Self {
        self.usage = Some((tokens_in, tokens_out));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn outcome(&self, index: usize, prompt: &str) -> Result<String, ProviderError> {
        match &self.script {
            Script::Cycle(outcomes) if outcomes.is_empty() => {
                Err(ProviderError::other("scripted provider has no responses"))
            }
            Script::Cycle(outcomes) => outcomes[index % outcomes.len()].clone(),
            Script::Handler(handler) => handler(index, prompt),
        }
    }
}

impl fmt::Debug for ScriptedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedProvider")
            .field("model", &self.model)
            .field("delay", &self.delay)
            .field("calls", &self.call_count())
            .finish()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete_with_usage(
        &self,
        _ctx: &Context,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(RecordedCall {
            prompt: prompt.to_string(),
            options: options.clone(),
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let text = self.outcome(index, prompt)?;
        let (tokens_in, tokens_out) = self
            .usage
            .unwrap_or(((prompt.len() / 4) as u64, (text.len() / 4) as u64));
        Ok(Completion {
            text,
            tokens_in,
            tokens_out,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}
