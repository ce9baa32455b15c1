use std::{collections::HashMap, sync::OnceLock};

use crate::{ConfigValue, ContextSet};

/// Flattened, dot-qualified view of a [`ContextSet`] used during rule matching.
///
/// A context named `User` with a property `age` is reachable as `"User.age"`; the name is used
/// as written. Contexts with a blank
/// name contribute unqualified keys. The flattened map is computed on first access and cached.
///
/// Equality only considers the underlying context set.
#[derive(Debug, Default)]
pub struct LookupContext {
    context_set: ContextSet,
    flattened: OnceLock<HashMap<String, ConfigValue>>,
}

impl LookupContext {
    /// Wrap a context set. Flattening is deferred until the first lookup.
    pub fn new(context_set: ContextSet) -> LookupContext {
        LookupContext {
            context_set,
            flattened: OnceLock::new(),
        }
    }

    /// The underlying context set.
    pub fn context_set(&self) -> &ContextSet {
        &self.context_set
    }

    /// Lookup a qualified property (e.g., `"user.email"`).
    pub fn get(&self, property: &str) -> Option<&ConfigValue> {
        self.flattened().get(property)
    }

    /// The full flattened map.
    pub fn flattened(&self) -> &HashMap<String, ConfigValue> {
        self.flattened.get_or_init(|| {
            let mut map = HashMap::new();
            for context in self.context_set.contexts() {
                for (property, value) in context.properties() {
                    let key = if context.name().trim().is_empty() {
                        property.clone()
                    } else {
                        format!("{}.{}", context.name(), property)
                    };
                    map.insert(key, value.clone());
                }
            }
            map
        })
    }
}

impl From<ContextSet> for LookupContext {
    fn from(value: ContextSet) -> Self {
        LookupContext::new(value)
    }
}

impl Clone for LookupContext {
    fn clone(&self) -> Self {
        LookupContext::new(self.context_set.clone())
    }
}

impl PartialEq for LookupContext {
    fn eq(&self, other: &Self) -> bool {
        self.context_set == other.context_set
    }
}
