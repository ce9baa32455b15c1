//! Layered config loading with per-key monotonic version acceptance.
use std::{collections::HashMap, io::BufReader, path::Path, sync::Mutex};

use chrono::{DateTime, Utc};

use crate::{
    config::{Config, ConfigElement, Configs, Provenance, Source, TryParse},
    ContextSet, Result,
};

/// An immutable snapshot of every layer merged together. Produced fresh on every load.
#[derive(Debug, Clone, Default)]
pub struct MergedConfigData {
    /// Key to config, after layering baseline, API, and override configs.
    pub configs: HashMap<String, ConfigElement>,
    /// Environment the API configs were served for (`0` when unknown).
    pub env_id: i64,
    /// Process-wide context supplied at construction.
    pub global_context: ContextSet,
    /// Context the server attached to its payload.
    pub api_default_context: ContextSet,
    /// Highest config id ever accepted from a batch.
    pub highwater: i64,
    /// When this snapshot was computed.
    pub loaded_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct ApiState {
    configs: HashMap<String, ConfigElement>,
    highwater: i64,
    env_id: i64,
    default_context: ContextSet,
}

/// Merges a fixed baseline layer, the live API layer, and a fixed override layer.
///
/// Only the API layer changes after construction. For any key, a config is accepted into it only
/// when no stored config for that key has a greater id.
pub struct ConfigLoader {
    baseline: HashMap<String, ConfigElement>,
    overrides: HashMap<String, ConfigElement>,
    global_context: ContextSet,
    api: Mutex<ApiState>,
}

impl ConfigLoader {
    /// Create a loader with the given fixed layers.
    pub fn new(
        baseline: HashMap<String, ConfigElement>,
        overrides: HashMap<String, ConfigElement>,
        global_context: ContextSet,
    ) -> ConfigLoader {
        ConfigLoader {
            baseline,
            overrides,
            global_context,
            api: Mutex::new(ApiState::default()),
        }
    }

    /// Apply a batch to the API layer.
    ///
    /// Configs whose id is lower than the stored one are ignored. Accepted configs without rows
    /// remove their key. Returns the highwater mark after the batch.
    pub fn set_configs(&self, configs: &Configs, provenance: Provenance) -> i64 {
        let mut api = self
            .api
            .lock()
            .expect("thread holding loader lock should not panic");

        for config in &configs.configs {
            match config {
                TryParse::Parsed(config) => {
                    api.set(ConfigElement::new(config.clone(), provenance.clone()));
                }
                TryParse::ParseFailed(raw) => {
                    log::warn!(target: "reforge", source:? = provenance.source; "skipping config that failed to parse: {raw}");
                }
            }
        }

        if let Some(pointer) = &configs.config_service_pointer {
            api.env_id = pointer.project_env_id;
        }
        if let Some(default_context) = &configs.default_context {
            api.default_context = default_context.clone();
        }

        api.highwater
    }

    /// Load a full batch from a JSON snapshot file. Any malformed content fails the whole load.
    pub fn load_from_json_file(&self, path: impl AsRef<Path>) -> Result<i64> {
        let path = path.as_ref();
        log::info!(target: "reforge", path:% = path.display(); "loading config snapshot");

        let file = std::fs::File::open(path)?;
        let configs: Configs = serde_json::from_reader(BufReader::new(file))?;
        for config in &configs.configs {
            if let TryParse::ParseFailed(raw) = config {
                // Surface the actual parse error for the offending config.
                serde_json::from_value::<Config>(raw.clone())?;
            }
        }

        Ok(self.set_configs(
            &configs,
            Provenance::with_location(Source::LocalFile, path.display().to_string()),
        ))
    }

    /// Overlay baseline, API, and override layers (later layers win key-for-key).
    pub fn calc_config(&self) -> MergedConfigData {
        let api = self
            .api
            .lock()
            .expect("thread holding loader lock should not panic");

        let mut configs = self.baseline.clone();
        configs.extend(
            api.configs
                .iter()
                .map(|(key, element)| (key.clone(), element.clone())),
        );
        configs.extend(
            self.overrides
                .iter()
                .map(|(key, element)| (key.clone(), element.clone())),
        );

        MergedConfigData {
            configs,
            env_id: api.env_id,
            global_context: self.global_context.clone(),
            api_default_context: api.default_context.clone(),
            highwater: api.highwater,
            loaded_at: Some(Utc::now()),
        }
    }

    /// Highest config id accepted so far. Never decreases.
    pub fn highwater_mark(&self) -> i64 {
        self.api
            .lock()
            .expect("thread holding loader lock should not panic")
            .highwater
    }
}

impl ApiState {
    fn set(&mut self, element: ConfigElement) {
        let config = &element.config;
        if let Some(existing) = self.configs.get(&config.key) {
            if existing.config.id > config.id {
                log::debug!(target: "reforge", config_key = config.key.as_str(), existing_id = existing.config.id, id = config.id; "ignoring stale config");
                return;
            }
        }

        self.highwater = self.highwater.max(config.id);
        if config.is_tombstone() {
            self.configs.remove(&config.key);
        } else {
            self.configs.insert(config.key.clone(), element);
        }
    }
}
