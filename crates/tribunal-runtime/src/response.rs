//! Parsing and validation of structured model responses.
//!
//! Model output is untrusted. A response is accepted only after three
//! gates: a JSON object can be located in the text, the object satisfies
//! the embedded JSON Schema, and the typed values pass range checks. Any
//! failure rejects the response; nothing is best-effort repaired.

use jsonschema::Validator;
use lazy_static::lazy_static;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tribunal_core::{extract_json, EvalError, JudgeSummary, ScoreScale};

/// Minimum length, in characters, of a model-written reasoning.
pub const MIN_REASONING_CHARS: usize = 10;

lazy_static! {
    static ref JUDGE_RESPONSE_SCHEMA: Validator = jsonschema::validator_for(&json!({
        "type": "object",
        "required": ["score", "confidence", "reasoning"],
        "properties": {
            "score": {"type": "number"},
            "confidence": {"type": "number"},
            "reasoning": {"type": "string"},
            "version": {"type": "integer"}
        }
    }))
    .unwrap();

    static ref VERIFICATION_RESPONSE_SCHEMA: Validator = jsonschema::validator_for(&json!({
        "type": "object",
        "required": ["confidence", "reasoning"],
        "properties": {
            "confidence": {"type": "number"},
            "reasoning": {"type": "string"},
            "issues": {"type": "array", "items": {"type": "string"}},
            "recommendation": {"type": "string"},
            "version": {"type": "integer"}
        }
    }))
    .unwrap();
}

#[derive(Debug, Deserialize)]
struct JudgeResponse {
    score: f64,
    confidence: f64,
    reasoning: String,
}

/// A verifier's critique of a verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Verifier confidence in the verdict (0.0 - 1.0)
    pub confidence: f64,

    pub reasoning: String,

    /// Problems found with the verdict, if any
    #[serde(default)]
    pub issues: Vec<String>,

    /// Suggested action for a reviewer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,

    #[serde(
        default,
        deserialize_with = "integral_version",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<i64>,
}

/// JSON Schema counts `1.0` as an integer, so serde has to as well.
fn integral_version<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<f64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(v) if v.fract() == 0.0 && v.abs() <= i64::MAX as f64 => Ok(Some(v as i64)),
        Some(v) => Err(D::Error::custom(format!("version must be an integer, got {}", v))),
    }
}

/// Locate, parse and schema-check the JSON object in `text`.
fn parse_object(text: &str, schema: &Validator) -> Result<Value, EvalError> {
    let raw = extract_json(text).ok_or(EvalError::NoJson)?;
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| EvalError::InvalidResponse(format!("malformed JSON: {}", e)))?;

    let violations: Vec<String> = schema
        .iter_errors(&value)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{} at {}", e, path)
            }
        })
        .collect();
    if !violations.is_empty() {
        return Err(EvalError::InvalidResponse(violations.join("; ")));
    }
    Ok(value)
}

fn check_confidence(confidence: f64) -> Result<(), EvalError> {
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(EvalError::InvalidResponse(format!(
            "confidence {} outside [0, 1]",
            confidence
        )));
    }
    Ok(())
}

fn check_reasoning(reasoning: &str) -> Result<(), EvalError> {
    let len = reasoning.trim().chars().count();
    if len < MIN_REASONING_CHARS {
        return Err(EvalError::InvalidResponse(format!(
            "reasoning has {} characters, need at least {}",
            len, MIN_REASONING_CHARS
        )));
    }
    Ok(())
}

/// Turn a judge's raw text into a validated [`JudgeSummary`].
pub fn parse_judge_response(
    text: &str,
    scale: &ScoreScale,
    min_confidence: f64,
) -> Result<JudgeSummary, EvalError> {
    let value = parse_object(text, &JUDGE_RESPONSE_SCHEMA)?;
    let response: JudgeResponse = serde_json::from_value(value)
        .map_err(|e| EvalError::InvalidResponse(e.to_string()))?;

    scale.check(response.score)?;
    check_confidence(response.confidence)?;
    check_reasoning(&response.reasoning)?;
    if response.confidence < min_confidence {
        return Err(EvalError::LowConfidence {
            confidence: response.confidence,
            min_confidence,
        });
    }

    Ok(JudgeSummary {
        score: response.score,
        reasoning: response.reasoning,
        confidence: response.confidence,
    })
}

/// Turn a verifier's raw text into a validated [`VerificationResult`].
pub fn parse_verification(text: &str) -> Result<VerificationResult, EvalError> {
    let value = parse_object(text, &VERIFICATION_RESPONSE_SCHEMA)?;
    let result: VerificationResult = serde_json::from_value(value)
        .map_err(|e| EvalError::InvalidResponse(e.to_string()))?;
    check_confidence(result.confidence)?;
    check_reasoning(&result.reasoning)?;
    Ok(result)
}
