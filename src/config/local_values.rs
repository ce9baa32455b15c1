//! Conversion of locally supplied value maps (baseline and override layers) into configs.
use std::collections::HashMap;

use crate::{
    config::{
        ConditionalValue, Config, ConfigElement, ConfigRow, ConfigType, Criterion,
        CriterionOperator, Provenance, Source, ValueSource,
    },
    ConfigValue, Error, Result,
};

const FEATURE_FLAG_MARKER: &str = "feature_flag";
const PARENT_KEY: &str = "_";

/// Flatten a nested JSON object of local values into config elements.
///
/// Nested object keys are joined with `.`; a nested key `_` holds the value of its parent. Objects
/// carrying a `feature_flag` member are converted into single-row feature flags.
pub(crate) fn load_local_values(
    values: &serde_json::Map<String, serde_json::Value>,
    location: &str,
) -> Result<HashMap<String, ConfigElement>> {
    let provenance = Provenance::with_location(Source::LocalOnly, location);
    let mut result = HashMap::new();
    for (key, value) in values {
        load_key_value(key.clone(), value, &provenance, &mut result)?;
    }
    Ok(result)
}

fn load_key_value(
    key: String,
    value: &serde_json::Value,
    provenance: &Provenance,
    result: &mut HashMap<String, ConfigElement>,
) -> Result<()> {
    match value {
        serde_json::Value::Object(map) if map.contains_key(FEATURE_FLAG_MARKER) => {
            let config = to_feature_flag(&key, map)?;
            result.insert(key, ConfigElement::new(config, provenance.clone()));
        }
        serde_json::Value::Object(map) => {
            for (nested, nested_value) in map {
                let nested_key = if nested == PARENT_KEY {
                    key.clone()
                } else {
                    format!("{key}.{nested}")
                };
                load_key_value(nested_key, nested_value, provenance, result)?;
            }
        }
        _ => {
            let value = ConfigValue::from_local(&key, value)?;
            let config = Config::constant(key.clone(), 0, value);
            result.insert(key, ConfigElement::new(config, provenance.clone()));
        }
    }
    Ok(())
}

fn to_feature_flag(key: &str, map: &serde_json::Map<String, serde_json::Value>) -> Result<Config> {
    let value = map
        .get("value")
        .ok_or_else(|| invalid(key, "feature flag must have a 'value' set"))?;
    let value = ConfigValue::from_local(key, value)?;

    let criteria = match map.get("criteria") {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(serde_json::Value::Object(criterion)) => vec![to_criterion(key, criterion)?],
        Some(serde_json::Value::Array(list)) => list
            .iter()
            .filter_map(|item| item.as_object())
            .map(|criterion| to_criterion(key, criterion))
            .collect::<Result<_>>()?,
        Some(_) => return Err(invalid(key, "'criteria' must be an object or a list")),
    };

    Ok(Config {
        id: 0,
        key: key.to_owned(),
        value_type: Some(value.value_type()),
        rows: vec![ConfigRow {
            project_env_id: None,
            values: vec![ConditionalValue {
                criteria,
                value: ValueSource::Value(value),
            }],
        }],
        config_type: ConfigType::FeatureFlag,
    })
}

fn to_criterion(key: &str, map: &serde_json::Map<String, serde_json::Value>) -> Result<Criterion> {
    let operator = map
        .get("operator")
        .ok_or_else(|| invalid(key, "each criterion must have an 'operator' set"))?;
    let operator: CriterionOperator = serde_json::from_value(operator.clone())
        .map_err(|_| invalid(key, &format!("unknown operator {operator}")))?;

    let property_name = match map.get("property") {
        Some(serde_json::Value::String(property)) => Some(property.clone()),
        Some(_) => return Err(invalid(key, "'property' must be a string")),
        None if operator.is_property_operator() => {
            return Err(invalid(
                key,
                "each criterion with a property operator must have a 'property' set",
            ))
        }
        None => None,
    };

    let values = map
        .get("values")
        .ok_or_else(|| invalid(key, "each criterion must have 'values' set"))?;

    Ok(Criterion {
        property_name,
        operator,
        value_to_match: Some(ConfigValue::from_local(key, values)?),
    })
}

fn invalid(key: &str, reason: &str) -> Error {
    Error::InvalidLocalValue {
        key: key.to_owned(),
        reason: reason.to_owned(),
    }
}
