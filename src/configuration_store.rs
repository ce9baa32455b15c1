//! A thread-safe in-memory storage for the currently active config snapshot.
//! [`ConfigurationStore`] provides lock-free access for readers (e.g., evaluation) and atomic
//! replacement for the writer (the updating resolver).
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use arc_swap::ArcSwap;

use crate::MergedConfigData;

/// `ConfigurationStore` provides a thread-safe (`Sync`) storage for the merged config snapshot.
///
/// The snapshot itself is always immutable and can only be replaced completely. Readers observe
/// either the entirely-old or the entirely-new snapshot.
pub struct ConfigurationStore {
    data: ArcSwap<MergedConfigData>,
    loaded: AtomicBool,
}

impl Default for ConfigurationStore {
    fn default() -> Self {
        ConfigurationStore {
            data: ArcSwap::from_pointee(MergedConfigData::default()),
            loaded: AtomicBool::new(false),
        }
    }
}

impl ConfigurationStore {
    /// Create a new empty configuration store.
    pub fn new() -> Self {
        ConfigurationStore::default()
    }

    /// Get the current snapshot. Empty until the first [`set_data`](Self::set_data).
    pub fn get_data(&self) -> Arc<MergedConfigData> {
        self.data.load_full()
    }

    /// Replace the current snapshot and mark the store as loaded.
    pub fn set_data(&self, data: Arc<MergedConfigData>) {
        self.data.store(data);
        self.loaded.store(true, Ordering::Release);
    }

    /// Whether a snapshot has ever been stored. Never reverts to `false`.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }
}
