//! Immutable evaluation state.
//!
//! A [`State`] maps typed keys to values. [`State::with`] never mutates: it
//! returns a new state sharing every untouched value with the old one, so
//! units running against the same snapshot cannot observe each other.

use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;

use crate::error::EvalError;
use crate::types::{Answer, BudgetReport, JudgeSummary, Verdict};

/// Errors from reading state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("state key '{key}' does not hold a {expected}")]
    TypeMismatch {
        key: &'static str,
        expected: &'static str,
    },
}

/// A state key bound to the type of value stored under it.
pub struct Key<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.name)
    }
}

/// Well-known keys.
pub mod keys {
    use super::*;

    pub const QUESTION: Key<String> = Key::new("question");
    pub const ANSWERS: Key<Vec<Answer>> = Key::new("answers");
    pub const REFERENCE_ANSWER: Key<String> = Key::new("reference_answer");
    pub const JUDGE_SCORES: Key<Vec<JudgeSummary>> = Key::new("judge_scores");
    pub const VERDICT: Key<Verdict> = Key::new("verdict");
    pub const BUDGET: Key<BudgetReport> = Key::new("budget");
    pub const TRACE_LEVEL: Key<String> = Key::new("trace_level");
    /// JSON-encoded verification result
    pub const VERIFICATION_TRACE: Key<String> = Key::new("verification_trace");
}

type Value = Arc<dyn Any + Send + Sync>;

/// Immutable, cheaply clonable key/value state.
#[derive(Clone, Default)]
pub struct State {
    entries: Arc<BTreeMap<&'static str, Value>>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key. A value of the wrong type is an error, absence is `Ok(None)`.
    pub fn get<T: Any + Send + Sync>(&self, key: Key<T>) -> Result<Option<&T>, StateError> {
        match self.entries.get(key.name) {
            None => Ok(None),
            Some(value) => value
                .downcast_ref::<T>()
                .map(Some)
                .ok_or(StateError::TypeMismatch {
                    key: key.name,
                    expected: type_name::<T>(),
                }),
        }
    }

    /// Look up a key that must be present.
    pub fn require<T: Any + Send + Sync>(&self, key: Key<T>) -> Result<&T, EvalError> {
        self.get(key)?.ok_or(EvalError::MissingInput(key.name))
    }

    /// Look up a string key that must be present and non-empty.
    pub fn require_text(&self, key: Key<String>) -> Result<&str, EvalError> {
        let value = self.require(key)?;
        if value.is_empty() {
            return Err(EvalError::MissingInput(key.name));
        }
        Ok(value)
    }

    /// Look up a list key that must be present and non-empty.
    pub fn require_list<T: Any + Send + Sync>(&self, key: Key<Vec<T>>) -> Result<&[T], EvalError> {
        let value = self.require(key)?;
        if value.is_empty() {
            return Err(EvalError::MissingInput(key.name));
        }
        Ok(value)
    }

    /// Return a new state with `key` bound to `value`.
    pub fn with<T: Any + Send + Sync>(&self, key: Key<T>, value: T) -> State {
        let mut entries = (*self.entries).clone();
        entries.insert(key.name, Arc::new(value));
        State {
            entries: Arc::new(entries),
        }
    }

    pub fn contains<T>(&self, key: Key<T>) -> bool {
        self.entries.contains_key(key.name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
