//! The Rust SDK for Reforge dynamic configuration and feature flags.
//!
//! # Overview
//!
//! The SDK revolves around a [`Client`] that resolves config keys to [`ConfigValue`]s for a
//! [`ContextSet`] describing who or what is asking (a user, a device, a request). Each config
//! holds ordered rules; the first rule whose criteria match the context decides the value.
//!
//! Configs come from up to three layers: baseline values supplied locally, configs served by the
//! Reforge api (or loaded from a snapshot file), and override values supplied locally. In remote
//! mode a background thread fetches configs once and then follows the config stream, publishing
//! each update as a new immutable snapshot. Readers never block on updates.
//!
//! A [`ConfigChangeListener`] receives a [`ConfigChangeEvent`] for every key that changes, and a
//! [`TelemetrySink`] receives every resolution.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Evaluation problems (a malformed rule, a missing environment variable) never surface as
//! errors: they are logged and the key resolves to nothing, so callers should always have a
//! default. The only error resolution calls return is the initialization outcome: a timeout under
//! [`OnInitializationFailure::Raise`], or a rejected sdk key.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging
//! messages, under the `reforge` target. Consider integrating a `log`-compatible logger
//! implementation for better visibility into SDK operations.
//!
//! # Examples
//!
//! ```
//! # use reforge::{ClientConfig, Context, ContextSet, ConfigValue};
//! let values = serde_json::json!({
//!     "greeting": "hello",
//!     "new-checkout": {
//!         "feature_flag": "true",
//!         "value": true,
//!         "criteria": {"operator": "PROP_IS_ONE_OF", "property": "user.plan", "values": ["pro"]},
//!     },
//! });
//! let client = ClientConfig::local_only()
//!     .baseline_values(values.as_object().unwrap().clone())
//!     .to_client()
//!     .unwrap();
//!
//! let context = ContextSet::from(Context::new("user").with("key", "u123").with("plan", "pro"));
//! assert_eq!(client.get("greeting", &context).unwrap(), Some(ConfigValue::from("hello")));
//! assert!(client.feature_is_on("new-checkout", &context).unwrap());
//! ```

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod client;
mod client_config;
pub mod config;
mod config_loader;
mod config_sync;
mod configuration_store;
mod context;
mod context_provider;
mod delta;
mod error;
mod eval;
mod listener;
mod lookup_context;
mod resolver;
mod sharder;
mod telemetry;
pub mod transport;
mod value;

pub use client::Client;
pub use client_config::{ClientConfig, DataSource, OnInitializationFailure};
pub use config_loader::{ConfigLoader, MergedConfigData};
pub use config_sync::Backoff;
pub use context::{Context, ContextSet};
pub use context_provider::{ContextProvider, NoopContextProvider};
pub use delta::{compute_change_events, ConfigChangeEvent};
pub use error::{Error, Result};
pub use eval::{EnvLookup, EvaluationError, Match, SystemEnvLookup};
pub use listener::{ConfigChangeListener, ListenerId};
pub use lookup_context::LookupContext;
pub use resolver::UpdatingConfigResolver;
pub use telemetry::TelemetrySink;
pub use value::{ConfigValue, LogLevel, ParseLogLevelError, ValueType};
