//! The unit the client talks to: load, swap, evaluate, diff.
use std::{path::Path, sync::Arc, sync::Mutex};

use crate::{
    config::{Configs, Provenance},
    config_loader::ConfigLoader,
    configuration_store::ConfigurationStore,
    context_provider::merge_contexts,
    delta::{compute_change_events, config_map, ConfigChangeEvent},
    eval::{EnvLookup, Evaluator},
    ContextSet, LookupContext, Match, MergedConfigData, Result,
};

/// Orchestrates loading configs, swapping the store snapshot, and computing change events.
///
/// Reads never block: they evaluate against whatever snapshot is current. Updates are serialized so
/// snapshots are published in highwater order.
pub struct UpdatingConfigResolver {
    loader: ConfigLoader,
    store: ConfigurationStore,
    env: Box<dyn EnvLookup>,
    update_lock: Mutex<()>,
}

impl UpdatingConfigResolver {
    /// Create a resolver over `loader`. Provided values are read through `env`.
    pub fn new(loader: ConfigLoader, env: Box<dyn EnvLookup>) -> UpdatingConfigResolver {
        UpdatingConfigResolver {
            loader,
            store: ConfigurationStore::new(),
            env,
            update_lock: Mutex::new(()),
        }
    }

    /// Feed a batch to the loader. Call [`update`](Self::update) to publish it.
    pub fn load_configs(&self, configs: &Configs, provenance: Provenance) -> i64 {
        self.loader.set_configs(configs, provenance)
    }

    /// Feed a snapshot file to the loader. Call [`update`](Self::update) to publish it.
    pub fn load_from_json_file(&self, path: impl AsRef<Path>) -> Result<i64> {
        self.loader.load_from_json_file(path)
    }

    /// Recompute the merged snapshot, publish it, and return what changed.
    pub fn update(&self) -> Vec<ConfigChangeEvent> {
        let _guard = self
            .update_lock
            .lock()
            .expect("thread holding update lock should not panic");

        let before = config_map(&self.store.get_data().configs);
        let data = Arc::new(self.loader.calc_config());
        let after = config_map(&data.configs);
        let highwater = data.highwater;
        self.store.set_data(data);

        let events = compute_change_events(&before, &after);
        log::debug!(target: "reforge", highwater, changes = events.len(); "published config snapshot");
        events
    }

    /// Resolve a single key. Evaluation errors are logged and reported as no match.
    pub fn get_match(&self, key: &str, lookup: &LookupContext) -> Option<Match> {
        let data = self.store.get_data();
        let element = data.configs.get(key)?;

        match Evaluator::new(&data, self.env.as_ref()).evaluate(element, lookup) {
            Ok(Some(result)) => {
                log::trace!(target: "reforge",
                    config_key = key,
                    value:serde = result.value;
                    "evaluated a config");
                Some(result)
            }
            Ok(None) => {
                log::trace!(target: "reforge", config_key = key; "no matching value");
                None
            }
            Err(err) => {
                log::warn!(target: "reforge",
                    config_key = key;
                    "error occurred while evaluating a config: {err}");
                None
            }
        }
    }

    /// Build the lookup context for one evaluation from every context layer of the current
    /// snapshot plus the caller-supplied ones.
    pub fn lookup_context(&self, ambient: &ContextSet, explicit: &ContextSet) -> LookupContext {
        let data = self.store.get_data();
        LookupContext::new(merge_contexts(
            Some(&data.api_default_context),
            &data.global_context,
            ambient,
            explicit,
        ))
    }

    /// Keys of every config in the current snapshot.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.store.get_data().configs.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// The current snapshot.
    pub fn data(&self) -> Arc<MergedConfigData> {
        self.store.get_data()
    }

    /// Highest config id seen so far.
    pub fn highwater_mark(&self) -> i64 {
        self.loader.highwater_mark()
    }

    /// Whether at least one snapshot has been published.
    pub fn is_loaded(&self) -> bool {
        self.store.is_loaded()
    }
}
