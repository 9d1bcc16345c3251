//! Unit configuration normalization.
//!
//! Every unit has a typed config struct with a `Default`. Untyped
//! [`Options`] maps (from pipeline files or `reconfigure`) are merged over a
//! base config, round-tripped through YAML into the typed shape, and then run
//! through the same validator a typed config goes through.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::EvalError;

/// Untyped unit options.
pub type Options = BTreeMap<String, serde_yaml::Value>;

/// A typed unit configuration.
pub trait UnitConfig: Serialize + DeserializeOwned + Default + Clone {
    /// Check value ranges and cross-field constraints.
    fn validate(&self) -> Result<(), EvalError>;
}

/// Merge `options` over `base` and parse into `C`, then validate.
pub fn from_options<C: UnitConfig>(base: &C, options: &Options) -> Result<C, EvalError> {
    let mut merged = match serde_yaml::to_value(base) {
        Ok(serde_yaml::Value::Mapping(map)) => map,
        Ok(_) => serde_yaml::Mapping::new(),
        Err(e) => return Err(EvalError::invalid_config(e.to_string())),
    };
    for (key, value) in options {
        merged.insert(serde_yaml::Value::String(key.clone()), value.clone());
    }

    let yaml = serde_yaml::to_string(&serde_yaml::Value::Mapping(merged))
        .map_err(|e| EvalError::invalid_config(e.to_string()))?;
    let config: C =
        serde_yaml::from_str(&yaml).map_err(|e| EvalError::invalid_config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Unit names must be non-empty.
pub fn validate_name(name: &str) -> Result<(), EvalError> {
    if name.trim().is_empty() {
        return Err(EvalError::invalid_config("unit name must not be empty"));
    }
    Ok(())
}

/// Fail unless `min <= value <= max`. NaN is never in range.
pub fn check_range<T>(field: &str, value: T, min: T, max: T) -> Result<(), EvalError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if !(min..=max).contains(&value) {
        return Err(EvalError::invalid_config(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, value
        )));
    }
    Ok(())
}

/// Numbers that may also be written as strings (`"0.5"`).
pub mod lenient {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Value(T),
        Text(String),
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + FromStr,
        T::Err: Display,
    {
        match Raw::<T>::deserialize(deserializer)? {
            Raw::Value(value) => Ok(value),
            Raw::Text(text) => text
                .trim()
                .parse()
                .map_err(|e| D::Error::custom(format!("invalid number '{}': {}", text, e))),
        }
    }
}

/// Durations as integer seconds or humantime strings (`"30s"`, `"2m"`).
pub mod duration {
    use std::time::Duration;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => {
                let text = text.trim();
                if let Ok(secs) = text.parse::<u64>() {
                    return Ok(Duration::from_secs(secs));
                }
                humantime::parse_duration(text)
                    .map_err(|e| D::Error::custom(format!("invalid duration '{}': {}", text, e)))
            }
        }
    }
}
