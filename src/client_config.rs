use std::{path::PathBuf, sync::Arc, time::Duration};

use url::Url;

use crate::{
    context_provider::NoopContextProvider,
    eval::SystemEnvLookup,
    telemetry::NoopTelemetrySink,
    Backoff, Client, ConfigChangeListener, ContextProvider, ContextSet, EnvLookup, Error, Result,
    TelemetrySink,
};

/// Where the client gets its configs from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// Fetch from the api hosts, then follow the config stream.
    Remote,
    /// Only baseline and override values. No network.
    LocalOnly,
    /// Load a snapshot file at startup. No network.
    LocalFile(PathBuf),
}

/// What to do when the client is not ready within the initialization timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnInitializationFailure {
    /// Return [`Error::InitializationTimeout`] from resolution calls.
    Raise,
    /// Carry on with whatever is loaded (possibly only local values).
    Unlock,
}

/// Configuration for [`Client`].
pub struct ClientConfig {
    pub(crate) sdk_key: String,
    pub(crate) api_hosts: Vec<String>,
    pub(crate) stream_hosts: Vec<String>,
    pub(crate) data_source: DataSource,
    pub(crate) initialization_timeout: Duration,
    pub(crate) on_initialization_failure: OnInitializationFailure,
    pub(crate) request_timeout: Duration,
    pub(crate) stream_backoff: Backoff,
    pub(crate) cache_capacity: usize,
    pub(crate) global_context: ContextSet,
    pub(crate) baseline_values: serde_json::Map<String, serde_json::Value>,
    pub(crate) override_values: serde_json::Map<String, serde_json::Value>,
    pub(crate) listeners: Vec<Arc<dyn ConfigChangeListener>>,
    pub(crate) telemetry_sink: Box<dyn TelemetrySink>,
    pub(crate) context_provider: Box<dyn ContextProvider + Send + Sync>,
    pub(crate) env_lookup: Box<dyn EnvLookup>,
}

impl ClientConfig {
    /// Default api hosts, in priority order.
    pub const DEFAULT_API_HOSTS: [&'static str; 2] =
        ["https://primary.reforge.com", "https://secondary.reforge.com"];
    /// Default stream host.
    pub const DEFAULT_STREAM_HOST: &'static str = "https://stream.reforge.com";
    /// Default value for [`ClientConfig::initialization_timeout`].
    pub const DEFAULT_INITIALIZATION_TIMEOUT: Duration = Duration::from_secs(10);
    /// Default value for [`ClientConfig::request_timeout`].
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
    /// Default value for [`ClientConfig::cache_capacity`].
    pub const DEFAULT_CACHE_CAPACITY: usize = 16;

    /// Create a configuration for remote mode using the specified SDK key.
    ///
    /// ```
    /// # use reforge::ClientConfig;
    /// ClientConfig::from_sdk_key("sdk-key");
    /// ```
    pub fn from_sdk_key(sdk_key: impl Into<String>) -> ClientConfig {
        ClientConfig {
            sdk_key: sdk_key.into().trim().to_owned(),
            api_hosts: ClientConfig::DEFAULT_API_HOSTS
                .iter()
                .map(|host| host.to_string())
                .collect(),
            stream_hosts: vec![ClientConfig::DEFAULT_STREAM_HOST.to_owned()],
            data_source: DataSource::Remote,
            initialization_timeout: ClientConfig::DEFAULT_INITIALIZATION_TIMEOUT,
            on_initialization_failure: OnInitializationFailure::Raise,
            request_timeout: ClientConfig::DEFAULT_REQUEST_TIMEOUT,
            stream_backoff: Backoff::default(),
            cache_capacity: ClientConfig::DEFAULT_CACHE_CAPACITY,
            global_context: ContextSet::new(),
            baseline_values: serde_json::Map::new(),
            override_values: serde_json::Map::new(),
            listeners: Vec::new(),
            telemetry_sink: Box::new(NoopTelemetrySink),
            context_provider: Box::new(NoopContextProvider),
            env_lookup: Box::new(SystemEnvLookup),
        }
    }

    /// Create a configuration that never touches the network.
    ///
    /// ```
    /// # use reforge::ClientConfig;
    /// let client = ClientConfig::local_only().to_client().unwrap();
    /// assert!(client.is_ready());
    /// ```
    pub fn local_only() -> ClientConfig {
        ClientConfig::from_sdk_key("").data_source(DataSource::LocalOnly)
    }

    /// Api hosts, in priority order. Hosts without a scheme get `https://`.
    pub fn api_hosts<S: Into<String>>(mut self, hosts: impl IntoIterator<Item = S>) -> ClientConfig {
        self.api_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Stream hosts, in priority order. Hosts without a scheme get `https://`.
    pub fn stream_hosts<S: Into<String>>(
        mut self,
        hosts: impl IntoIterator<Item = S>,
    ) -> ClientConfig {
        self.stream_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Where configs come from. Defaults to [`DataSource::Remote`].
    pub fn data_source(mut self, data_source: DataSource) -> ClientConfig {
        self.data_source = data_source;
        self
    }

    /// How long resolution calls wait for the first configs, counted from client creation.
    pub fn initialization_timeout(mut self, timeout: Duration) -> ClientConfig {
        self.initialization_timeout = timeout;
        self
    }

    /// Defaults to [`OnInitializationFailure::Raise`].
    pub fn on_initialization_failure(mut self, policy: OnInitializationFailure) -> ClientConfig {
        self.on_initialization_failure = policy;
        self
    }

    /// Timeout of a single config fetch, or of establishing the stream.
    pub fn request_timeout(mut self, timeout: Duration) -> ClientConfig {
        self.request_timeout = timeout;
        self
    }

    /// Delay between fetch retries and stream reconnects.
    pub fn stream_backoff(mut self, backoff: Backoff) -> ClientConfig {
        self.stream_backoff = backoff;
        self
    }

    /// Maximum number of cached config responses.
    pub fn cache_capacity(mut self, capacity: usize) -> ClientConfig {
        self.cache_capacity = capacity;
        self
    }

    /// Context applied to every evaluation, below ambient and explicit contexts.
    pub fn global_context(mut self, context: ContextSet) -> ClientConfig {
        self.global_context = context;
        self
    }

    /// Values used when the server has nothing for a key.
    ///
    /// ```
    /// # use reforge::ClientConfig;
    /// let values = serde_json::json!({"timeouts": {"db": 100, "_": 5}});
    /// let config = ClientConfig::local_only()
    ///     .baseline_values(values.as_object().unwrap().clone());
    /// ```
    pub fn baseline_values(
        mut self,
        values: serde_json::Map<String, serde_json::Value>,
    ) -> ClientConfig {
        self.baseline_values = values;
        self
    }

    /// Values that win over anything the server sends.
    pub fn override_values(
        mut self,
        values: serde_json::Map<String, serde_json::Value>,
    ) -> ClientConfig {
        self.override_values = values;
        self
    }

    /// Register a change listener before the first configs are loaded.
    pub fn listener(mut self, listener: impl ConfigChangeListener + 'static) -> ClientConfig {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Set a sink receiving every resolution.
    ///
    /// ```
    /// # use reforge::{ClientConfig, LookupContext, Match};
    /// let config = ClientConfig::local_only().telemetry_sink(
    ///     |key: &str, result: Option<&Match>, _context: &LookupContext| {
    ///         println!("{key}: {:?}", result.map(|m| &m.value));
    ///     },
    /// );
    /// ```
    pub fn telemetry_sink(mut self, sink: impl TelemetrySink + 'static) -> ClientConfig {
        self.telemetry_sink = Box::new(sink);
        self
    }

    /// Supplies ambient context (e.g., the current request) for every evaluation.
    pub fn context_provider(
        mut self,
        provider: impl ContextProvider + Send + Sync + 'static,
    ) -> ClientConfig {
        self.context_provider = Box::new(provider);
        self
    }

    /// Where provided values are looked up. Defaults to the process environment.
    pub fn env_lookup(mut self, env_lookup: impl EnvLookup + 'static) -> ClientConfig {
        self.env_lookup = Box::new(env_lookup);
        self
    }

    /// Create a new [`Client`] using the specified configuration.
    pub fn to_client(self) -> Result<Client> {
        Client::new(self)
    }
}

/// Parse a configured host, defaulting the scheme to `https`.
pub(crate) fn parse_host(host: &str) -> Result<Url> {
    let host = host.trim();
    let with_scheme = if host.contains("://") {
        host.to_owned()
    } else {
        format!("https://{host}")
    };
    Url::parse(&with_scheme).map_err(|source| Error::InvalidHostUrl {
        host: host.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{parse_host, ClientConfig, DataSource, OnInitializationFailure};
    use crate::Error;

    #[test]
    fn defaults() {
        let config = ClientConfig::from_sdk_key("  key-123 \n");

        assert_eq!(config.sdk_key, "key-123");
        assert_eq!(config.data_source, DataSource::Remote);
        assert_eq!(config.initialization_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.cache_capacity, 16);
        assert_eq!(
            config.on_initialization_failure,
            OnInitializationFailure::Raise
        );
        assert_eq!(config.api_hosts.len(), 2);
    }

    #[test]
    fn hosts_default_to_https() {
        assert_eq!(
            parse_host("api.example.com").unwrap().as_str(),
            "https://api.example.com/"
        );
        assert_eq!(
            parse_host("http://localhost:8080").unwrap().as_str(),
            "http://localhost:8080/"
        );
        assert!(matches!(
            parse_host("https://"),
            Err(Error::InvalidHostUrl { .. })
        ));
    }
}
