//! Turns snapshot transitions into discrete change events.
use std::{collections::HashMap, sync::Arc};

use crate::config::{Config, ConfigElement};

/// A single key changed between two snapshots.
///
/// `old` is `None` when the key was added; `new` is `None` when it was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChangeEvent {
    /// Key that changed.
    pub key: String,
    /// Config before the change.
    pub old: Option<Arc<Config>>,
    /// Config after the change.
    pub new: Option<Arc<Config>>,
}

/// Key to config view of a snapshot, restricted to configs that have at least one row.
pub(crate) fn config_map(configs: &HashMap<String, ConfigElement>) -> HashMap<String, Arc<Config>> {
    configs
        .iter()
        .filter(|(_, element)| !element.config.rows.is_empty())
        .map(|(key, element)| (key.clone(), element.config.clone()))
        .collect()
}

/// Emit one event for every key whose config differs between `before` and `after`.
///
/// Configs are compared by value. Order of the returned events is unspecified.
pub fn compute_change_events(
    before: &HashMap<String, Arc<Config>>,
    after: &HashMap<String, Arc<Config>>,
) -> Vec<ConfigChangeEvent> {
    let mut events = Vec::new();

    for (key, old) in before {
        match after.get(key) {
            Some(new) if new == old => {}
            new => events.push(ConfigChangeEvent {
                key: key.clone(),
                old: Some(old.clone()),
                new: new.cloned(),
            }),
        }
    }

    for (key, new) in after {
        if !before.contains_key(key) {
            events.push(ConfigChangeEvent {
                key: key.clone(),
                old: None,
                new: Some(new.clone()),
            });
        }
    }

    events
}
