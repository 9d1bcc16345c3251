//! Score scales written as `"min-max"`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EvalError;

/// Largest absolute endpoint a scale may have.
pub const MAX_ENDPOINT: f64 = 1000.0;

/// Narrowest allowed scale.
pub const MIN_WIDTH: f64 = 0.01;

/// A closed score interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreScale {
    min: f64,
    max: f64,
}

impl ScoreScale {
    pub fn new(min: f64, max: f64) -> Result<Self, EvalError> {
        for endpoint in [min, max] {
            if !endpoint.is_finite() || endpoint.abs() > MAX_ENDPOINT {
                return Err(invalid(format!(
                    "endpoint {} outside [-{}, {}]",
                    endpoint, MAX_ENDPOINT, MAX_ENDPOINT
                )));
            }
        }
        if min >= max {
            return Err(invalid(format!("min {} must be below max {}", min, max)));
        }
        if max - min < MIN_WIDTH {
            return Err(invalid(format!(
                "range {}-{} is narrower than {}",
                min, max, MIN_WIDTH
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && score <= self.max
    }

    /// Fail unless `score` is finite and inside the scale.
    pub fn check(&self, score: f64) -> Result<(), EvalError> {
        if !score.is_finite() {
            return Err(EvalError::NonFiniteScore(score));
        }
        if !self.contains(score) {
            return Err(EvalError::ScoreOutOfScale {
                score,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

impl Default for ScoreScale {
    fn default() -> Self {
        Self {
            min: 1.0,
            max: 10.0,
        }
    }
}

fn invalid(reason: String) -> EvalError {
    EvalError::invalid_config(format!("score_scale: {}", reason))
}

fn endpoint(raw: &str, text: &str) -> Result<f64, EvalError> {
    if raw.is_empty() || raw == "-" || raw == "+" {
        return Err(invalid(format!("'{}' has an empty endpoint", text)));
    }
    raw.parse::<f64>()
        .map_err(|_| invalid(format!("'{}' is not a number in '{}'", raw, text)))
}

impl FromStr for ScoreScale {
    type Err = EvalError;

    /// Accepts `1-10`, `0.0-1.0`, `-5-10`, `1--3` and `-5--3`.
    ///
    /// The separator is the first dash after the leading character, so a
    /// leading dash always signs the lower endpoint and a dash right after
    /// the separator signs the upper one. An explicitly negative upper
    /// endpoint written after a non-negative lower one (`1--3`) names the
    /// interval `[-3, 1]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let dashes = text.matches('-').count();
        if dashes == 0 || dashes > 4 {
            return Err(invalid(format!("'{}' is not of the form min-max", text)));
        }

        let sep = text
            .char_indices()
            .skip(1)
            .find(|&(_, c)| c == '-')
            .map(|(i, _)| i)
            .ok_or_else(|| invalid(format!("'{}' is not of the form min-max", text)))?;

        let lo_raw = text[..sep].trim();
        let hi_raw = text[sep + 1..].trim();
        let lo = endpoint(lo_raw, text)?;
        let hi = endpoint(hi_raw, text)?;

        if hi_raw.starts_with('-') && !lo_raw.starts_with('-') && hi < lo {
            return ScoreScale::new(hi, lo);
        }
        ScoreScale::new(lo, hi)
    }
}

impl fmt::Display for ScoreScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

impl Serialize for ScoreScale {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ScoreScale {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_forms() {
        let cases = [
            ("1-10", 1.0, 10.0),
            ("0.0-1.0", 0.0, 1.0),
            ("-5-10", -5.0, 10.0),
            ("1--3", -3.0, 1.0),
            ("-5--3", -5.0, -3.0),
        ];
        for (text, min, max) in cases {
            let scale: ScoreScale = text.parse().unwrap_or_else(|e| panic!("{}: {}", text, e));
            assert_eq!((scale.min(), scale.max()), (min, max), "{}", text);
        }
    }

    #[test]
    fn test_rejected_forms() {
        for text in [
            "1to10", "1-2-3", "abc-10", "5-5", "10-1", "1.0-1.005", "-1001-10", "0-1001", "1.0-1.0",
            "-10", "5-", "--5", "1-----3",
        ] {
            let result = text.parse::<ScoreScale>();
            assert!(result.is_err(), "{} should be rejected", text);
            assert!(matches!(result.unwrap_err(), EvalError::InvalidConfig(_)));
        }
    }

    #[test]
    fn test_check() {
        let scale: ScoreScale = "1-10".parse().unwrap();
        assert!(scale.check(1.0).is_ok());
        assert!(scale.check(10.0).is_ok());
        assert!(matches!(
            scale.check(11.0),
            Err(EvalError::ScoreOutOfScale { .. })
        ));
        assert!(matches!(
            scale.check(f64::NAN),
            Err(EvalError::NonFiniteScore(_))
        ));
    }

    #[test]
    fn test_serde_as_string() {
        let scale: ScoreScale = serde_yaml::from_str("\"-5-10\"").unwrap();
        assert_eq!(scale.min(), -5.0);
        assert_eq!(serde_json::to_string(&scale).unwrap(), "\"-5-10\"");
    }
}
