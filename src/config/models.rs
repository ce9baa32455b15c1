use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{ConfigValue, ContextSet, ValueType};

/// A batch of configs as served by the config endpoint, the streaming endpoint, or a local snapshot
/// file.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Configs {
    /// Describes where the batch comes from. Streaming keep-alive frames carry no pointer.
    #[serde(default)]
    pub config_service_pointer: Option<ConfigServicePointer>,
    /// Configs in this batch.
    ///
    /// Each config is wrapped in `TryParse` so that if we fail to parse one config (e.g., new
    /// server format), we can still serve other configs.
    #[serde(default)]
    pub configs: Vec<TryParse<Config>>,
    /// Context the server attached to the batch. Used as the lowest-precedence context during
    /// evaluation.
    #[serde(default)]
    pub default_context: Option<ContextSet>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ConfigServicePointer {
    #[serde(default)]
    pub project_id: i64,
    #[serde(default)]
    pub project_env_id: i64,
    /// Highest config id included in the batch.
    #[serde(default)]
    pub highest_id: i64,
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(serde_json::Value),
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

impl<'a, T> From<&'a TryParse<T>> for Option<&'a T> {
    fn from(value: &TryParse<T>) -> Option<&T> {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

impl<T> From<T> for TryParse<T> {
    fn from(value: T) -> Self {
        TryParse::Parsed(value)
    }
}

/// A named, versioned definition of how to compute a value.
///
/// A config with no rows is a tombstone: loading it removes the key.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Version. Higher ids supersede lower ones for the same key.
    #[serde(default)]
    pub id: i64,
    /// Config key, e.g. `"timeouts.db"`.
    pub key: String,
    /// Rows in evaluation order.
    #[serde(default)]
    pub rows: Vec<ConfigRow>,
    /// Whether this is a plain config, a feature flag, or a segment.
    #[serde(default)]
    pub config_type: ConfigType,
    /// Declared value type. Required to coerce provided (environment) values.
    #[serde(default)]
    pub value_type: Option<ValueType>,
}

impl Config {
    /// Build a single-row config that always resolves to `value`.
    pub fn constant(key: impl Into<String>, id: i64, value: impl Into<ConfigValue>) -> Config {
        let value = value.into();
        Config {
            id,
            key: key.into(),
            value_type: Some(value.value_type()),
            rows: vec![ConfigRow {
                project_env_id: None,
                values: vec![ConditionalValue {
                    criteria: Vec::new(),
                    value: ValueSource::Value(value),
                }],
            }],
            config_type: ConfigType::Config,
        }
    }

    /// Build a tombstone for `key`.
    pub fn tombstone(key: impl Into<String>, id: i64) -> Config {
        Config {
            id,
            key: key.into(),
            rows: Vec::new(),
            config_type: ConfigType::Config,
            value_type: None,
        }
    }

    /// A config without rows marks the key as deleted.
    pub fn is_tombstone(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum ConfigType {
    #[default]
    Config,
    FeatureFlag,
    Segment,
    LogLevel,
}

/// Ordered list of conditional values, optionally scoped to a single environment.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRow {
    /// Rows scoped to another environment are skipped during evaluation.
    #[serde(default)]
    pub project_env_id: Option<i64>,
    #[allow(missing_docs)]
    #[serde(default)]
    pub values: Vec<ConditionalValue>,
}

/// A value that applies when every criterion matches.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalValue {
    /// All criteria must match. An empty list always matches.
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    #[allow(missing_docs)]
    pub value: ValueSource,
}

/// What a conditional value resolves to.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ValueSource {
    /// A weighted distribution over values, selected deterministically per context.
    Weighted {
        #[allow(missing_docs)]
        #[serde(rename = "weightedValues")]
        weighted_values: WeightedValues,
    },
    /// A value read from the process environment at evaluation time.
    Provided {
        #[allow(missing_docs)]
        provided: Provided,
    },
    /// A literal value.
    Value(ConfigValue),
}

impl<T: Into<ConfigValue>> From<T> for ValueSource {
    fn from(value: T) -> Self {
        ValueSource::Value(value.into())
    }
}

impl From<WeightedValues> for ValueSource {
    fn from(weighted_values: WeightedValues) -> Self {
        ValueSource::Weighted { weighted_values }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct WeightedValues {
    pub weighted_values: Vec<WeightedValue>,
    /// Lookup property whose value seeds the selection. When absent (or missing from the context),
    /// the context fingerprint is used instead.
    #[serde(default)]
    pub hash_by_property_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct WeightedValue {
    pub weight: u32,
    pub value: ConfigValue,
}

/// Reference to an environment variable.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Provided {
    pub env_var: String,
}

/// `Criterion` checks that the context property `property_name` matches `value_to_match` under the
/// given `operator`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Criterion {
    #[serde(default)]
    pub property_name: Option<String>,
    pub operator: CriterionOperator,
    #[serde(default)]
    pub value_to_match: Option<ConfigValue>,
}

/// Possible criterion operators.
///
/// Property operators (`PROP_*`, `IN_INT_RANGE`) require a `property_name`. An absent property
/// never matches, including for the negated operators.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriterionOperator {
    /// Always matches.
    AlwaysTrue,
    /// Property is one of the values.
    #[serde(alias = "PROPERTY_IS_ONE_OF")]
    PropIsOneOf,
    /// Property is none of the values.
    #[serde(alias = "PROPERTY_IS_NOT_ONE_OF")]
    PropIsNotOneOf,
    /// Property starts with one of the values.
    #[serde(alias = "PROPERTY_STARTS_WITH_ONE_OF")]
    PropStartsWithOneOf,
    /// Property starts with none of the values.
    #[serde(alias = "PROPERTY_DOES_NOT_START_WITH_ONE_OF")]
    PropDoesNotStartWithOneOf,
    /// Property ends with one of the values.
    #[serde(alias = "PROPERTY_ENDS_WITH_ONE_OF")]
    PropEndsWithOneOf,
    /// Property ends with none of the values.
    #[serde(alias = "PROPERTY_DOES_NOT_END_WITH_ONE_OF")]
    PropDoesNotEndWithOneOf,
    /// Property contains one of the values.
    #[serde(alias = "PROPERTY_CONTAINS_ONE_OF")]
    PropContainsOneOf,
    /// Property contains none of the values.
    #[serde(alias = "PROPERTY_DOES_NOT_CONTAIN_ONE_OF")]
    PropDoesNotContainOneOf,
    /// Property matches a regex. Value must be a regex string.
    #[serde(alias = "PROPERTY_MATCHES")]
    PropMatches,
    /// Property does not match a regex. Value must be a regex string.
    #[serde(alias = "PROPERTY_DOES_NOT_MATCH")]
    PropDoesNotMatch,
    /// Numeric comparison.
    #[serde(alias = "PROPERTY_GREATER_THAN")]
    PropGreaterThan,
    /// Numeric comparison.
    #[serde(alias = "PROPERTY_GREATER_THAN_OR_EQUAL")]
    PropGreaterThanOrEqual,
    /// Numeric comparison.
    #[serde(alias = "PROPERTY_LESS_THAN")]
    PropLessThan,
    /// Numeric comparison.
    #[serde(alias = "PROPERTY_LESS_THAN_OR_EQUAL")]
    PropLessThanOrEqual,
    /// Semantic version comparison. Value must be a semver string.
    #[serde(alias = "PROPERTY_SEMVER_EQUAL")]
    PropSemverEqual,
    /// Semantic version comparison. Value must be a semver string.
    #[serde(alias = "PROPERTY_SEMVER_GREATER_THAN")]
    PropSemverGreaterThan,
    /// Semantic version comparison. Value must be a semver string.
    #[serde(alias = "PROPERTY_SEMVER_LESS_THAN")]
    PropSemverLessThan,
    /// Integer property falls in `[start, end)`. Value must be a JSON object with optional `start`
    /// and `end` members.
    InIntRange,
    /// Context is a member of the segment named by the value.
    InSeg,
    /// Context is not a member of the segment named by the value.
    NotInSeg,
}

impl CriterionOperator {
    /// Whether the operator reads a context property.
    pub fn is_property_operator(&self) -> bool {
        !matches!(
            self,
            CriterionOperator::AlwaysTrue | CriterionOperator::InSeg | CriterionOperator::NotInSeg
        )
    }
}

/// Where a config came from.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum Source {
    LocalOnly,
    LocalFile,
    RemoteApi,
    Streaming,
    InitTimeout,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Provenance {
    pub source: Source,
    #[serde(default)]
    pub source_location: Option<String>,
}

impl Provenance {
    /// Provenance without a location.
    pub fn new(source: Source) -> Provenance {
        Provenance {
            source,
            source_location: None,
        }
    }

    /// Provenance with a location such as a file path or uri.
    pub fn with_location(source: Source, location: impl Into<String>) -> Provenance {
        Provenance {
            source,
            source_location: Some(location.into()),
        }
    }
}

/// A [`Config`] together with the [`Provenance`] it was loaded from.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigElement {
    /// The config itself, shared between snapshots.
    pub config: Arc<Config>,
    /// Where the config came from.
    pub provenance: Provenance,
}

impl ConfigElement {
    /// Wrap a config loaded from `provenance`.
    pub fn new(config: Config, provenance: Provenance) -> ConfigElement {
        ConfigElement {
            config: Arc::new(config),
            provenance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Configs, CriterionOperator, TryParse, ValueSource};
    use crate::ConfigValue;

    #[test]
    fn parse_snapshot_fixture() {
        let file = std::fs::File::open("tests/data/snapshot.json").unwrap();
        let configs: Configs = serde_json::from_reader(std::io::BufReader::new(file)).unwrap();

        assert!(configs.config_service_pointer.is_some());
        assert!(configs
            .configs
            .iter()
            .all(|c| matches!(c, TryParse::Parsed(_))));
    }

    #[test]
    fn parse_partially_if_unexpected() {
        let configs: Configs = serde_json::from_str(
            r#"
              {
                "configServicePointer": {"projectId": 1, "projectEnvId": 2, "highestId": 5},
                "configs": [
                  {
                    "id": 4,
                    "key": "success",
                    "rows": [{"values": [{"value": {"bool": true}}]}]
                  },
                  {
                    "id": 5,
                    "key": "fail_parsing",
                    "rows": [{"values": [{"criteria": [{"operator": "NEW_OPERATOR"}], "value": {"bool": true}}]}]
                  }
                ]
              }
            "#,
        )
        .unwrap();

        assert!(matches!(configs.configs[0], TryParse::Parsed(_)));
        assert!(matches!(configs.configs[1], TryParse::ParseFailed(_)));
    }

    #[test]
    fn value_sources() {
        let weighted: ValueSource = serde_json::from_str(
            r#"{"weightedValues": {"weightedValues": [{"weight": 1, "value": {"int": 1}}], "hashByPropertyName": "user.key"}}"#,
        )
        .unwrap();
        assert!(matches!(weighted, ValueSource::Weighted { .. }));

        let provided: ValueSource =
            serde_json::from_str(r#"{"provided": {"envVar": "HOME"}}"#).unwrap();
        assert!(matches!(provided, ValueSource::Provided { .. }));

        let literal: ValueSource = serde_json::from_str(r#"{"string": "hi"}"#).unwrap();
        assert_eq!(literal, ValueSource::Value(ConfigValue::from("hi")));
    }

    #[test]
    fn operator_aliases() {
        let op: CriterionOperator = serde_json::from_str(r#""PROPERTY_ENDS_WITH_ONE_OF""#).unwrap();
        assert_eq!(op, CriterionOperator::PropEndsWithOneOf);
        let op: CriterionOperator =
            serde_json::from_str(r#""PROP_DOES_NOT_END_WITH_ONE_OF""#).unwrap();
        assert_eq!(op, CriterionOperator::PropDoesNotEndWithOneOf);
    }
}
