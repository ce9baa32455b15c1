use std::borrow::Cow;

use regex::Regex;
use semver::Version;

use crate::{config::CriterionOperator, ConfigValue};

impl CriterionOperator {
    /// Applying the operator to a property value. Returns `false` if the operator cannot be applied
    /// (including when the property is absent) or there's a misconfiguration.
    pub(crate) fn eval(
        &self,
        property: Option<&ConfigValue>,
        value_to_match: Option<&ConfigValue>,
    ) -> bool {
        self.try_eval(property, value_to_match).unwrap_or(false)
    }

    /// Try applying the operator, returning `None` if it cannot be applied.
    ///
    /// Segment operators are resolved by the evaluator and always return `None` here.
    fn try_eval(
        &self,
        property: Option<&ConfigValue>,
        value_to_match: Option<&ConfigValue>,
    ) -> Option<bool> {
        match self {
            Self::AlwaysTrue => Some(true),

            Self::PropIsOneOf
            | Self::PropIsNotOneOf
            | Self::PropStartsWithOneOf
            | Self::PropDoesNotStartWithOneOf
            | Self::PropEndsWithOneOf
            | Self::PropDoesNotEndWithOneOf
            | Self::PropContainsOneOf
            | Self::PropDoesNotContainOneOf => {
                let s = property?.to_match_string()?;
                let values = match_set(value_to_match?)?;

                let (found, expected) = match self {
                    Self::PropIsOneOf => (values.iter().any(|v| *v == s), true),
                    Self::PropIsNotOneOf => (values.iter().any(|v| *v == s), false),
                    Self::PropStartsWithOneOf => {
                        (values.iter().any(|v| s.starts_with(&**v)), true)
                    }
                    Self::PropDoesNotStartWithOneOf => {
                        (values.iter().any(|v| s.starts_with(&**v)), false)
                    }
                    Self::PropEndsWithOneOf => {
                        (values.iter().any(|v| s.ends_with(&**v)), true)
                    }
                    Self::PropDoesNotEndWithOneOf => {
                        (values.iter().any(|v| s.ends_with(&**v)), false)
                    }
                    Self::PropContainsOneOf => (values.iter().any(|v| s.contains(&**v)), true),
                    _ => (values.iter().any(|v| s.contains(&**v)), false),
                };
                Some(found == expected)
            }

            Self::PropMatches | Self::PropDoesNotMatch => {
                let s = property?.to_match_string()?;
                let regex = Regex::new(value_to_match?.as_str()?).ok()?;
                let matches = regex.is_match(&s);
                Some(if matches!(self, Self::PropMatches) {
                    matches
                } else {
                    !matches
                })
            }

            Self::PropGreaterThan
            | Self::PropGreaterThanOrEqual
            | Self::PropLessThan
            | Self::PropLessThanOrEqual => {
                let ordering = match (property?, value_to_match?) {
                    (ConfigValue::Int(a), ConfigValue::Int(b)) => a.cmp(b),
                    (a, b) => as_number(a)?.partial_cmp(&as_number(b)?)?,
                };
                Some(match self {
                    Self::PropGreaterThan => ordering.is_gt(),
                    Self::PropGreaterThanOrEqual => ordering.is_ge(),
                    Self::PropLessThan => ordering.is_lt(),
                    _ => ordering.is_le(),
                })
            }

            Self::PropSemverEqual | Self::PropSemverGreaterThan | Self::PropSemverLessThan => {
                let property_version = Version::parse(property?.as_str()?.trim()).ok()?;
                let version = Version::parse(value_to_match?.as_str()?.trim()).ok()?;
                Some(match self {
                    Self::PropSemverEqual => property_version == version,
                    Self::PropSemverGreaterThan => property_version > version,
                    _ => property_version < version,
                })
            }

            Self::InIntRange => {
                let v = match property? {
                    ConfigValue::Int(i) => *i,
                    ConfigValue::String(s) => s.trim().parse().ok()?,
                    _ => return None,
                };
                let range = value_to_match?.as_json()?;
                let start = match range.get("start") {
                    Some(start) => start.as_i64()?,
                    None => i64::MIN,
                };
                let end = match range.get("end") {
                    Some(end) => end.as_i64()?,
                    None => i64::MAX,
                };
                Some(start <= v && v < end)
            }

            Self::InSeg | Self::NotInSeg => None,
        }
    }
}

/// Values a `*_ONE_OF` operator compares against. A scalar is treated as a single-element set.
fn match_set(value: &ConfigValue) -> Option<Vec<Cow<'_, str>>> {
    match value {
        ConfigValue::StringList(list) => Some(list.iter().map(|s| Cow::Borrowed(s.as_str())).collect()),
        other => Some(vec![other.to_match_string()?]),
    }
}

fn as_number(value: &ConfigValue) -> Option<f64> {
    match value {
        ConfigValue::Int(i) => Some(*i as f64),
        ConfigValue::Double(d) => Some(*d),
        ConfigValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{config::CriterionOperator, ConfigValue};

    fn list(values: &[&str]) -> ConfigValue {
        ConfigValue::from(values.to_vec())
    }

    #[test]
    fn always_true() {
        assert!(CriterionOperator::AlwaysTrue.eval(None, None));
    }

    #[test]
    fn one_of() {
        let values = list(&["alice", "bob"]);
        assert!(CriterionOperator::PropIsOneOf.eval(Some(&"alice".into()), Some(&values)));
        assert!(!CriterionOperator::PropIsOneOf.eval(Some(&"charlie".into()), Some(&values)));
        assert!(!CriterionOperator::PropIsOneOf.eval(None, Some(&values)));
    }

    #[test]
    fn not_one_of() {
        let values = list(&["alice", "bob"]);
        assert!(!CriterionOperator::PropIsNotOneOf.eval(Some(&"bob".into()), Some(&values)));
        assert!(CriterionOperator::PropIsNotOneOf.eval(Some(&"charlie".into()), Some(&values)));

        // Absent properties never match, even for negated operators.
        assert!(!CriterionOperator::PropIsNotOneOf.eval(None, Some(&values)));
    }

    #[test]
    fn one_of_non_string_property() {
        assert!(CriterionOperator::PropIsOneOf.eval(Some(&42_i64.into()), Some(&list(&["42"]))));
        assert!(CriterionOperator::PropIsOneOf.eval(Some(&true.into()), Some(&list(&["true"]))));
    }

    #[test]
    fn ends_with() {
        let domains = list(&["@example.com", "@example.org"]);
        assert!(CriterionOperator::PropEndsWithOneOf
            .eval(Some(&"jane@example.com".into()), Some(&domains)));
        assert!(!CriterionOperator::PropEndsWithOneOf
            .eval(Some(&"jane@other.com".into()), Some(&domains)));
    }

    #[test]
    fn does_not_end_with() {
        let domains = list(&["@example.com", "@example.org"]);
        assert!(!CriterionOperator::PropDoesNotEndWithOneOf
            .eval(Some(&"jane@example.com".into()), Some(&domains)));
        assert!(CriterionOperator::PropDoesNotEndWithOneOf
            .eval(Some(&"jane@other.com".into()), Some(&domains)));
        assert!(!CriterionOperator::PropDoesNotEndWithOneOf.eval(None, Some(&domains)));
    }

    #[test]
    fn starts_with_and_contains() {
        let values = list(&["abc"]);
        assert!(CriterionOperator::PropStartsWithOneOf.eval(Some(&"abcdef".into()), Some(&values)));
        assert!(CriterionOperator::PropDoesNotStartWithOneOf
            .eval(Some(&"xabc".into()), Some(&values)));
        assert!(CriterionOperator::PropContainsOneOf.eval(Some(&"xabcx".into()), Some(&values)));
        assert!(!CriterionOperator::PropDoesNotContainOneOf
            .eval(Some(&"xabcx".into()), Some(&values)));
    }

    #[test]
    fn regex() {
        let pattern = ConfigValue::from("^test.*");
        assert!(CriterionOperator::PropMatches.eval(Some(&"test@example.com".into()), Some(&pattern)));
        assert!(!CriterionOperator::PropMatches.eval(Some(&"example@test.com".into()), Some(&pattern)));
        assert!(CriterionOperator::PropDoesNotMatch
            .eval(Some(&"example@test.com".into()), Some(&pattern)));
        assert!(!CriterionOperator::PropDoesNotMatch.eval(None, Some(&pattern)));
        // Invalid regex never matches.
        assert!(!CriterionOperator::PropMatches.eval(Some(&"a".into()), Some(&"(".into())));
    }

    #[test]
    fn numeric_comparison() {
        assert!(CriterionOperator::PropGreaterThan.eval(Some(&11_i64.into()), Some(&10_i64.into())));
        assert!(!CriterionOperator::PropGreaterThan.eval(Some(&10_i64.into()), Some(&10_i64.into())));
        assert!(CriterionOperator::PropGreaterThanOrEqual
            .eval(Some(&10_i64.into()), Some(&10_i64.into())));
        assert!(CriterionOperator::PropLessThan.eval(Some(&9.5.into()), Some(&10_i64.into())));
        assert!(CriterionOperator::PropLessThanOrEqual.eval(Some(&"3".into()), Some(&3.0.into())));
        assert!(!CriterionOperator::PropLessThan.eval(Some(&"abc".into()), Some(&3_i64.into())));
    }

    #[test]
    fn semver_comparison() {
        let version = ConfigValue::from("1.2.3");
        assert!(CriterionOperator::PropSemverEqual.eval(Some(&"1.2.3".into()), Some(&version)));
        assert!(CriterionOperator::PropSemverGreaterThan
            .eval(Some(&"1.10.0".into()), Some(&version)));
        assert!(CriterionOperator::PropSemverLessThan.eval(Some(&"1.2.3-rc.1".into()), Some(&version)));
        assert!(!CriterionOperator::PropSemverEqual.eval(Some(&"not a version".into()), Some(&version)));
    }

    #[test]
    fn int_range() {
        let range = ConfigValue::Json(json!({"start": 10, "end": 20}));
        assert!(CriterionOperator::InIntRange.eval(Some(&10_i64.into()), Some(&range)));
        assert!(CriterionOperator::InIntRange.eval(Some(&19_i64.into()), Some(&range)));
        assert!(!CriterionOperator::InIntRange.eval(Some(&20_i64.into()), Some(&range)));

        let open_ended = ConfigValue::Json(json!({"start": 10}));
        assert!(!CriterionOperator::InIntRange.eval(Some(&i64::MAX.into()), Some(&open_ended)));
        assert!(CriterionOperator::InIntRange.eval(Some(&1_000_000_i64.into()), Some(&open_ended)));
    }
}
