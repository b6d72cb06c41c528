//! Loosely-typed config maps and their typed extractors
//!
//! Constructors consume a `HashMap<String, ConfigValue>` rather than a typed
//! struct so the factory registry can instantiate strategies it has never
//! heard of. The extractors here are the only way values leave the map: each
//! one fails with a precise error naming the key and the offending type.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};

/// One loosely-typed configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Int(i64),
    Float(f64),
    Str(String),
    Duration(Duration),
}

impl ConfigValue {
    fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Int(_) => "integer",
            ConfigValue::Float(_) => "float",
            ConfigValue::Str(_) => "string",
            ConfigValue::Duration(_) => "duration",
        }
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Str(value)
    }
}

impl From<Duration> for ConfigValue {
    fn from(value: Duration) -> Self {
        ConfigValue::Duration(value)
    }
}

/// The map shape constructors consume.
pub type ConfigMap = HashMap<String, ConfigValue>;

fn lookup<'a>(config: &'a ConfigMap, key: &str) -> Result<&'a ConfigValue> {
    config
        .get(key)
        .ok_or_else(|| Error::MissingKey(key.to_string()))
}

/// Extract an integer, narrowing floats the way the scripts do.
pub fn get_i64(config: &ConfigMap, key: &str) -> Result<i64> {
    match lookup(config, key)? {
        ConfigValue::Int(v) => Ok(*v),
        ConfigValue::Float(v) => Ok(*v as i64),
        other => Err(Error::TypeMismatch {
            key: key.to_string(),
            expected: "integer",
            actual: other.type_name(),
        }),
    }
}

/// Extract a string.
pub fn get_str(config: &ConfigMap, key: &str) -> Result<String> {
    match lookup(config, key)? {
        ConfigValue::Str(v) => Ok(v.clone()),
        other => Err(Error::TypeMismatch {
            key: key.to_string(),
            expected: "string",
            actual: other.type_name(),
        }),
    }
}

/// Extract a duration. No string parsing: only a real duration value counts.
pub fn get_duration(config: &ConfigMap, key: &str) -> Result<Duration> {
    match lookup(config, key)? {
        ConfigValue::Duration(v) => Ok(*v),
        other => Err(Error::TypeMismatch {
            key: key.to_string(),
            expected: "duration",
            actual: other.type_name(),
        }),
    }
}
