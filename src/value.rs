use std::{borrow::Cow, str::FromStr, time::Duration};

use derive_more::From;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::{Error, Result};

/// Keys under this prefix hold log levels. String values supplied locally for such keys must
/// parse as a [`LogLevel`].
pub(crate) const LOG_LEVEL_PREFIX: &str = "log-level";

/// A resolved configuration value.
///
/// Exactly one variant is set at a time. Conveniently implements `From` conversions for the
/// underlying types.
///
/// # Examples
/// ```
/// # use reforge::ConfigValue;
/// let flag: ConfigValue = true.into();
/// let limit: ConfigValue = 42_i64.into();
/// let name: ConfigValue = "reforge".into();
/// assert_eq!(limit.as_int(), Some(42));
/// ```
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(rename_all = "camelCase")]
pub enum ConfigValue {
    /// A boolean value.
    Bool(bool),
    /// A 64-bit integer.
    Int(i64),
    /// A floating point number.
    Double(f64),
    /// A string value.
    String(String),
    /// A list of strings.
    StringList(Vec<String>),
    /// A duration, transferred as milliseconds.
    Duration(#[serde_as(as = "DurationMilliSeconds<u64>")] Duration),
    /// A log level.
    LogLevel(LogLevel),
    /// An opaque JSON object.
    Json(serde_json::Value),
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<Vec<&str>> for ConfigValue {
    fn from(value: Vec<&str>) -> Self {
        Self::StringList(value.into_iter().map(str::to_owned).collect())
    }
}

impl ConfigValue {
    /// Return the value if it is a [`ConfigValue::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Return the value if it is a [`ConfigValue::Int`].
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Return the value if it is a [`ConfigValue::Double`].
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Return the value if it is a [`ConfigValue::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Return the value if it is a [`ConfigValue::StringList`].
    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            Self::StringList(list) => Some(list),
            _ => None,
        }
    }

    /// Return the value if it is a [`ConfigValue::Duration`].
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Duration(d) => Some(*d),
            _ => None,
        }
    }

    /// Return the value if it is a [`ConfigValue::LogLevel`].
    pub fn as_log_level(&self) -> Option<LogLevel> {
        match self {
            Self::LogLevel(level) => Some(*level),
            _ => None,
        }
    }

    /// Return the value if it is a [`ConfigValue::Json`].
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Return the type of the value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Double(_) => ValueType::Double,
            Self::String(_) => ValueType::String,
            Self::StringList(_) => ValueType::StringList,
            Self::Duration(_) => ValueType::Duration,
            Self::LogLevel(_) => ValueType::LogLevel,
            Self::Json(_) => ValueType::Json,
        }
    }

    /// Render a scalar value into the form property operators compare against.
    ///
    /// Returns `None` for lists and JSON objects, which have no single comparable form.
    pub(crate) fn to_match_string(&self) -> Option<Cow<'_, str>> {
        Some(match self {
            Self::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Self::Int(i) => Cow::Owned(i.to_string()),
            Self::Double(d) => Cow::Owned(d.to_string()),
            Self::String(s) => Cow::Borrowed(s.as_str()),
            Self::Duration(d) => Cow::Owned(d.as_millis().to_string()),
            Self::LogLevel(level) => Cow::Borrowed(level.as_str()),
            Self::StringList(_) | Self::Json(_) => return None,
        })
    }

    /// Stable textual rendering, e.g. `string: "u123"`.
    pub(crate) fn to_fingerprint_string(&self) -> String {
        let rendered = match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Double(d) => d.to_string(),
            Self::String(s) => serde_json::Value::from(s.as_str()).to_string(),
            Self::StringList(list) => serde_json::Value::from(list.clone()).to_string(),
            Self::Duration(d) => d.as_millis().to_string(),
            Self::LogLevel(level) => level.as_str().to_owned(),
            Self::Json(v) => v.to_string(),
        };
        format!("{}: {}", self.value_type().as_str(), rendered)
    }

    /// Convert a loosely typed local value (e.g., from an override map) into a `ConfigValue`.
    ///
    /// Strings stored under the `log-level` namespace must name a recognized log level.
    pub fn from_local(key: &str, value: &serde_json::Value) -> Result<ConfigValue> {
        let invalid = |reason: String| Error::InvalidLocalValue {
            key: key.to_owned(),
            reason,
        };

        Ok(match value {
            serde_json::Value::Bool(b) => ConfigValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ConfigValue::Int(i),
                None => ConfigValue::Double(
                    n.as_f64()
                        .ok_or_else(|| invalid(format!("unsupported number {n}")))?,
                ),
            },
            serde_json::Value::String(s) if key.starts_with(LOG_LEVEL_PREFIX) => {
                ConfigValue::LogLevel(
                    s.parse()
                        .map_err(|_| invalid(format!("{s:?} is not a log level")))?,
                )
            }
            serde_json::Value::String(s) => ConfigValue::String(s.clone()),
            serde_json::Value::Array(items) => ConfigValue::StringList(
                items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_owned)
                            .ok_or_else(|| invalid("lists may only contain strings".to_owned()))
                    })
                    .collect::<Result<_>>()?,
            ),
            serde_json::Value::Object(_) => ConfigValue::Json(value.clone()),
            serde_json::Value::Null => return Err(invalid("null is not a value".to_owned())),
        })
    }
}

/// Log level values that configs under the `log-level` namespace resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// Upper-case wire name, e.g. `"INFO"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// Map to the `log` crate's filter. `Fatal` has no counterpart and maps to `Error`.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error | LogLevel::Fatal => log::LevelFilter::Error,
        }
    }
}

/// Error returned when a string does not name a [`LogLevel`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized log level {0:?}")]
pub struct ParseLogLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => LogLevel::Trace,
            "DEBUG" => LogLevel::Debug,
            "INFO" => LogLevel::Info,
            "WARN" => LogLevel::Warn,
            "ERROR" => LogLevel::Error,
            "FATAL" => LogLevel::Fatal,
            _ => return Err(ParseLogLevelError(s.to_owned())),
        })
    }
}

/// Declared type of a config's value.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum ValueType {
    Bool,
    Int,
    Double,
    String,
    StringList,
    Duration,
    LogLevel,
    Json,
}

impl ValueType {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::StringList => "string_list",
            ValueType::Duration => "duration",
            ValueType::LogLevel => "log_level",
            ValueType::Json => "json",
        }
    }

    /// Coerce a raw string (e.g., an environment variable) into a value of this type.
    pub(crate) fn coerce(&self, raw: &str) -> Option<ConfigValue> {
        Some(match self {
            ValueType::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => ConfigValue::Bool(true),
                "false" => ConfigValue::Bool(false),
                _ => return None,
            },
            ValueType::Int => ConfigValue::Int(raw.trim().parse().ok()?),
            ValueType::Double => ConfigValue::Double(raw.trim().parse().ok()?),
            ValueType::String => ConfigValue::String(raw.to_owned()),
            ValueType::StringList => ConfigValue::StringList(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect(),
            ),
            ValueType::Duration => {
                ConfigValue::Duration(Duration::from_millis(raw.trim().parse().ok()?))
            }
            ValueType::LogLevel => ConfigValue::LogLevel(raw.parse().ok()?),
            ValueType::Json => ConfigValue::Json(serde_json::from_str(raw).ok()?),
        })
    }
}
