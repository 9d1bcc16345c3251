//! End-to-end pipeline runs against a scripted model.

use std::sync::Arc;
use std::time::Duration;

use tribunal_core::{keys, Answer, BudgetReport, Context, EvalError, JudgeSummary, State, UnitKind};
use tribunal_runtime::{
    build_unit, LlmProvider, Pipeline, PipelineSpec, ScriptedProvider, UnitSpec, VerificationResult,
};

const FULL_PIPELINE: &str = r#"
name: capital-cities
units:
  - kind: answerer
    name: gen
    options:
      num_answers: 3
      max_concurrency: 2
      timeout: 10s
  - kind: score_judge
    name: judge
    options:
      score_scale: "0-1"
      min_confidence: 0.5
  - kind: arithmetic_mean
    name: pool
    options:
      tie_breaker: first
  - kind: verifier
    name: verify
    options:
      confidence_threshold: "0.8"
"#;

const VERIFIER_REASONING: &str = "Answer 2 is correct but the judges disagree noticeably.";

/// Routes each prompt to a canned reply based on which unit sent it.
fn scripted_model() -> ScriptedProvider {
    ScriptedProvider::with_handler("scripted", |call, prompt| {
        if prompt.starts_with("Answer the following question") {
            let answer = ["Lyon", "Paris", "Marseille"][call % 3];
            return Ok(answer.to_string());
        }
        if prompt.contains("impartial judge") {
            let score = if prompt.contains("\nParis\n") {
                0.9
            } else if prompt.contains("\nLyon\n") {
                0.7
            } else {
                0.8
            };
            return Ok(format!(
                r#"Here is my grading:
```json
{{"score": {}, "confidence": 0.9, "reasoning": "Graded against the known capital.", "version": 1}}
```"#,
                score
            ));
        }
        Ok(format!(
            r#"{{"confidence": 0.6, "reasoning": "{}", "issues": ["judge spread"], "version": 1}}"#,
            VERIFIER_REASONING
        ))
    })
}

fn scored(answers: &[&str], scores: &[f64]) -> State {
    State::new()
        .with(
            keys::ANSWERS,
            answers
                .iter()
                .map(|id| Answer::new(*id, format!("content of {}", id)))
                .collect::<Vec<_>>(),
        )
        .with(
            keys::JUDGE_SCORES,
            scores
                .iter()
                .map(|s| JudgeSummary::deterministic(*s, "scored upstream"))
                .collect::<Vec<_>>(),
        )
}

async fn run_single(spec: UnitSpec, state: &State) -> Result<State, tribunal_core::UnitError> {
    let unit = build_unit(&spec, None)?;
    unit.execute(&Context::background(), state).await
}

#[tokio::test]
async fn arithmetic_mean_winner_is_best_scored() {
    let spec = UnitSpec::new(UnitKind::MeanPool, "pool")
        .with_option("tie_breaker", "first")
        .with_option("min_score", 0.0)
        .with_option("require_all_scores", true);
    let out = run_single(spec, &scored(&["a1", "a2", "a3"], &[0.7, 0.9, 0.8]))
        .await
        .unwrap();

    let verdict = out.require(keys::VERDICT).unwrap();
    assert_eq!(verdict.winner_answer.id, "a2");
    assert!((verdict.aggregate_score - 0.8).abs() < 1e-9);
    assert!(!verdict.requires_human_review);
}

#[tokio::test]
async fn median_on_even_count_takes_first_middle() {
    let spec = UnitSpec::new(UnitKind::MedianPool, "median").with_option("tie_breaker", "first");
    let out = run_single(spec, &scored(&["a1", "a2", "a3", "a4"], &[0.2, 0.6, 0.7, 0.9]))
        .await
        .unwrap();

    let verdict = out.require(keys::VERDICT).unwrap();
    assert!((verdict.aggregate_score - 0.65).abs() < 1e-9);
    assert_eq!(verdict.winner_answer.id, "a2");
    assert_eq!(verdict.id, "median_verdict");
}

#[tokio::test]
async fn max_tie_with_error_policy_fails() {
    let spec = UnitSpec::new(UnitKind::MaxPool, "max").with_option("tie_breaker", "error");
    let input = scored(&["a1", "a2", "a3"], &[0.8, 0.8, 0.7]);
    let err = run_single(spec, &input).await.unwrap_err();

    assert!(matches!(err.source, EvalError::Tie(_)));
    assert!(err.to_string().contains("2 answers with score 0.800"), "{}", err);
    assert!(!input.contains(keys::VERDICT));
}

#[tokio::test]
async fn exact_match_ignores_case_and_padding() {
    let input = State::new()
        .with(keys::REFERENCE_ANSWER, "hello world".to_string())
        .with(
            keys::ANSWERS,
            vec![
                Answer::new("a1", "Hello World"),
                Answer::new("a2", "hello world"),
                Answer::new("a3", "  Hello World  "),
            ],
        );
    let out = run_single(UnitSpec::new(UnitKind::ExactMatch, "exact"), &input)
        .await
        .unwrap();

    let scores = out.require(keys::JUDGE_SCORES).unwrap();
    assert_eq!(scores.len(), 3);
    assert!(scores.iter().all(|s| s.score == 1.0 && s.confidence == 1.0));
}

#[tokio::test]
async fn verifier_flags_review_and_records_trace() {
    let provider = Arc::new(scripted_model());
    let spec = PipelineSpec::from_yaml(FULL_PIPELINE).unwrap();
    spec.validate().unwrap();
    let pipeline = Pipeline::from_spec(&spec, Some(provider.clone() as Arc<dyn LlmProvider>)).unwrap();

    let input = State::new()
        .with(keys::QUESTION, "What is the capital of France?".to_string())
        .with(keys::TRACE_LEVEL, "Debug".to_string())
        .with(keys::BUDGET, BudgetReport::default());
    let out = pipeline.run(&Context::background(), &input).await.unwrap();

    let answers = out.require(keys::ANSWERS).unwrap();
    let ids: Vec<&str> = answers.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["gen_answer_1", "gen_answer_2", "gen_answer_3"]);

    let scores = out.require(keys::JUDGE_SCORES).unwrap();
    for (answer, score) in answers.iter().zip(scores) {
        let expected = match answer.content.as_str() {
            "Paris" => 0.9,
            "Lyon" => 0.7,
            _ => 0.8,
        };
        assert_eq!(score.score, expected);
    }

    let verdict = out.require(keys::VERDICT).unwrap();
    assert_eq!(verdict.id, "pool_verdict");
    assert_eq!(verdict.winner_answer.content, "Paris");
    assert!(verdict.requires_human_review);

    let trace: VerificationResult =
        serde_json::from_str(out.require(keys::VERIFICATION_TRACE).unwrap()).unwrap();
    assert_eq!(trace.confidence, 0.6);
    assert_eq!(trace.reasoning, VERIFIER_REASONING);
    assert_eq!(trace.issues, vec!["judge spread".to_string()]);

    // 3 answers + 3 judgements + 1 verification
    let budget = out.require(keys::BUDGET).unwrap();
    assert_eq!(budget.calls_made, 7);
    assert!(budget.tokens_used > 0);
    assert_eq!(provider.call_count(), 7);
    assert!(provider.max_in_flight() <= 2);
}

#[tokio::test]
async fn cancelled_context_stops_answerer() {
    let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider::new("scripted", "Paris"));
    let unit = build_unit(&UnitSpec::new(UnitKind::Answerer, "gen"), Some(provider)).unwrap();
    let (ctx, cancel) = Context::background().with_cancel();
    cancel.cancel();

    let input = State::new().with(keys::QUESTION, "What is the capital of France?".to_string());
    let err = unit.execute(&ctx, &input).await.unwrap_err();

    assert!(err.to_string().contains("context canceled"), "{}", err);
    assert!(err.is_cancellation());
    assert!(!input.contains(keys::ANSWERS));
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_batch_returns_no_partial_answers() {
    let provider = Arc::new(ScriptedProvider::new("scripted", "Paris").delay(Duration::from_secs(2)));
    let unit = build_unit(
        &UnitSpec::new(UnitKind::Answerer, "gen")
            .with_option("num_answers", 6)
            .with_option("max_concurrency", 2),
        Some(provider.clone() as Arc<dyn LlmProvider>),
    )
    .unwrap();
    let (ctx, cancel) = Context::background().with_cancel();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        cancel.cancel();
    });
    let input = State::new().with(keys::QUESTION, "What is the capital of France?".to_string());
    let err = unit.execute(&ctx, &input).await.unwrap_err();
    canceller.await.unwrap();

    assert!(err.is_cancellation());
    assert!(provider.call_count() < 6);
    assert_eq!(provider.max_in_flight(), 2);
}
