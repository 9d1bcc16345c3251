//! Evaluation cases loaded from YAML or JSON files.

use std::path::Path;

use anyhow::{Context as _, Result};
use serde::Deserialize;
use tribunal_core::{keys, Answer, JudgeSummary, State};

/// An answer written either as bare text or as `{id, content}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CaseAnswer {
    Text(String),
    Full { id: String, content: String },
}

/// One evaluation input.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Case {
    #[serde(default)]
    pub question: Option<String>,

    #[serde(default)]
    pub answers: Vec<CaseAnswer>,

    #[serde(default)]
    pub reference_answer: Option<String>,

    #[serde(default)]
    pub judge_scores: Option<Vec<JudgeSummary>>,

    #[serde(default)]
    pub trace_level: Option<String>,
}

impl Case {
    /// YAML is a superset of JSON, so both formats load here.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading case file {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing case file {}", path.display()))
    }

    /// Bare-text answers get ids `case_answer_<n>`.
    pub fn into_state(self) -> State {
        let mut state = State::new();
        if let Some(question) = self.question {
            state = state.with(keys::QUESTION, question);
        }
        if !self.answers.is_empty() {
            let answers: Vec<Answer> = self
                .answers
                .into_iter()
                .enumerate()
                .map(|(i, answer)| match answer {
                    CaseAnswer::Text(content) => Answer::new(Answer::id_for("case", i), content),
                    CaseAnswer::Full { id, content } => Answer::new(id, content),
                })
                .collect();
            state = state.with(keys::ANSWERS, answers);
        }
        if let Some(reference) = self.reference_answer {
            state = state.with(keys::REFERENCE_ANSWER, reference);
        }
        if let Some(scores) = self.judge_scores {
            state = state.with(keys::JUDGE_SCORES, scores);
        }
        if let Some(level) = self.trace_level {
            state = state.with(keys::TRACE_LEVEL, level);
        }
        state
    }
}
