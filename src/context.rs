//! Evaluation input: named attribute bags ([`Context`]) composed into a [`ContextSet`].
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ConfigValue;

/// Property every context may carry to identify its subject. Used for fingerprinting and as the
/// fallback weighted-selection seed.
pub const KEY_PROPERTY: &str = "key";

/// A named bag of attributes describing part of the evaluation subject (e.g., "user", "device").
///
/// The name is kept as written and prefixes flattened property keys. Within a [`ContextSet`]
/// names are compared case-insensitively.
///
/// # Examples
/// ```
/// # use reforge::Context;
/// let user = Context::new("User")
///     .with("key", "u123")
///     .with("age", 44_i64);
/// assert_eq!(user.name(), "User");
/// assert_eq!(user.get("age").and_then(|v| v.as_int()), Some(44));
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Context {
    #[serde(rename = "type")]
    name: String,
    #[serde(rename = "values", default)]
    properties: BTreeMap<String, ConfigValue>,
}

impl Context {
    /// Create an empty context with the given name.
    pub fn new(name: impl AsRef<str>) -> Context {
        Context {
            name: name.as_ref().to_owned(),
            properties: BTreeMap::new(),
        }
    }

    /// Add a property, replacing any previous value under the same name.
    pub fn with(mut self, property: impl Into<String>, value: impl Into<ConfigValue>) -> Context {
        self.properties.insert(property.into(), value.into());
        self
    }

    /// The name as written, e.g. `"User"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lookup an unqualified property.
    pub fn get(&self, property: &str) -> Option<&ConfigValue> {
        self.properties.get(property)
    }

    /// All properties, in property-name order.
    pub fn properties(&self) -> &BTreeMap<String, ConfigValue> {
        &self.properties
    }

    /// Whether the context carries no properties.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Overlay `other`'s properties on top of this context's.
    fn merge_from(&mut self, other: &Context) {
        for (property, value) in &other.properties {
            self.properties.insert(property.clone(), value.clone());
        }
    }

    fn fingerprint(&self, name: &str) -> Option<String> {
        self.properties
            .get(KEY_PROPERTY)
            .map(|key| format!("{name}--{}", key.to_fingerprint_string()))
    }
}

/// A collection of [`Context`]s, one per distinct (lower-cased) name.
///
/// Adding a context with a name that is already present replaces the previous one. Iteration is in
/// name order, so insertion order never affects equality, serialization, or the fingerprint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "WireContextSet", into = "WireContextSet")]
pub struct ContextSet {
    contexts: BTreeMap<String, Context>,
}

#[derive(Serialize, Deserialize)]
struct WireContextSet {
    #[serde(default)]
    contexts: Vec<Context>,
}

impl From<WireContextSet> for ContextSet {
    fn from(value: WireContextSet) -> Self {
        ContextSet::from_iter(value.contexts)
    }
}

impl From<ContextSet> for WireContextSet {
    fn from(value: ContextSet) -> Self {
        WireContextSet {
            contexts: value.contexts.into_values().collect(),
        }
    }
}

impl FromIterator<Context> for ContextSet {
    fn from_iter<T: IntoIterator<Item = Context>>(iter: T) -> Self {
        let mut set = ContextSet::new();
        for context in iter {
            set.add_context(context);
        }
        set
    }
}

impl From<Context> for ContextSet {
    fn from(value: Context) -> Self {
        ContextSet::from_iter([value])
    }
}

impl ContextSet {
    /// Create an empty set.
    pub fn new() -> ContextSet {
        ContextSet::default()
    }

    /// Add a context, replacing any existing context with the same name.
    pub fn add_context(&mut self, context: Context) {
        self.contexts.insert(context.name.to_lowercase(), context);
    }

    /// Builder-style variant of [`ContextSet::add_context`].
    pub fn with_context(mut self, context: Context) -> ContextSet {
        self.add_context(context);
        self
    }

    /// Look up a context by name (case-insensitive).
    pub fn get_by_name(&self, name: &str) -> Option<&Context> {
        self.contexts.get(&name.to_lowercase())
    }

    /// Iterate contexts in name order.
    pub fn contexts(&self) -> impl Iterator<Item = &Context> {
        self.contexts.values()
    }

    /// Whether the set holds no contexts.
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Number of distinct context names.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Overlay every context of `other` onto this set. Contexts sharing a name are merged
    /// property-for-property with `other` winning; contexts only present on one side survive
    /// untouched.
    pub fn merge(&mut self, other: &ContextSet) {
        for (name, context) in &other.contexts {
            match self.contexts.get_mut(name) {
                Some(existing) => existing.merge_from(context),
                None => {
                    self.contexts.insert(name.clone(), context.clone());
                }
            }
        }
    }

    /// Approximate identity of the subject described by this set, for deduplication.
    ///
    /// Concatenates, in lower-cased name order, `"{name}--{rendered key}"` for every context carrying a `key`
    /// property. Sets without keyed contexts produce an empty string.
    pub fn fingerprint(&self) -> String {
        self.contexts
            .iter()
            .filter_map(|(name, context)| context.fingerprint(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Context, ContextSet};

    #[test]
    fn names_are_case_insensitive() {
        let set = ContextSet::new()
            .with_context(Context::new("User").with("key", "a"))
            .with_context(Context::new("USER").with("key", "b"));

        assert_eq!(set.len(), 1);
        assert_eq!(
            set.get_by_name("user").and_then(|c| c.get("key")),
            Some(&"b".into())
        );
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let a = ContextSet::new()
            .with_context(Context::new("user").with("key", "u1"))
            .with_context(Context::new("device").with("os", "linux"));
        let b = ContextSet::new()
            .with_context(Context::new("device").with("os", "linux"))
            .with_context(Context::new("user").with("key", "u1"));

        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_uses_keyed_contexts() {
        let set = ContextSet::new()
            .with_context(Context::new("user").with("key", "u123").with("age", 3_i64))
            .with_context(Context::new("team").with("key", 7_i64))
            .with_context(Context::new("device").with("os", "linux"));

        assert_eq!(set.fingerprint(), r#"team--int: 7user--string: "u123""#);
    }

    #[test]
    fn fingerprint_empty() {
        assert_eq!(ContextSet::new().fingerprint(), "");
        assert_eq!(ContextSet::from(Context::new("user")).fingerprint(), "");
    }

    #[test]
    fn merge_overlays_properties() {
        let mut base = ContextSet::new()
            .with_context(Context::new("user").with("key", "u1").with("plan", "free"))
            .with_context(Context::new("app").with("version", "1.0"));
        base.merge(
            &ContextSet::new()
                .with_context(Context::new("User").with("plan", "pro"))
                .with_context(Context::new("request").with("path", "/")),
        );

        let user = base.get_by_name("user").unwrap();
        assert_eq!(user.get("key"), Some(&"u1".into()));
        assert_eq!(user.get("plan"), Some(&"pro".into()));
        assert!(base.get_by_name("app").is_some());
        assert!(base.get_by_name("request").is_some());
    }

    #[test]
    fn deserialize_wire_shape() {
        let set: ContextSet = serde_json::from_value(json!({
            "contexts": [
                {"type": "User", "values": {"key": {"string": "u1"}, "age": {"int": 4}}},
            ]
        }))
        .unwrap();

        let user = set.get_by_name("user").unwrap();
        assert_eq!(user.name(), "User");
        assert_eq!(user.get("age"), Some(&4_i64.into()));
    }

    #[test]
    fn name_keeps_case_but_fingerprint_lowercases() {
        let set = ContextSet::from(Context::new("User").with("key", "u1"));

        assert_eq!(set.get_by_name("USER").map(Context::name), Some("User"));
        assert_eq!(set.fingerprint(), r#"user--string: "u1""#);
    }
}
