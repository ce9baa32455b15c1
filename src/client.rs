use std::{
    collections::HashMap,
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

use crate::{
    client_config::parse_host,
    config::{load_local_values, Configs, Provenance, Source},
    config_loader::ConfigLoader,
    config_sync::{ConfigSink, ConfigSyncThread},
    listener::ListenerRegistry,
    transport::{HttpClient, HttpClientConfig, HttpTransport, ReqwestTransport},
    ClientConfig, ConfigChangeEvent, ConfigChangeListener, ConfigValue, ContextProvider,
    ContextSet, DataSource, Error, ListenerId, LookupContext, Match, OnInitializationFailure,
    Result, TelemetrySink, UpdatingConfigResolver,
};

/// A client for Reforge configs and feature flags.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// # Examples
/// ```
/// # use reforge::{ClientConfig, ContextSet};
/// let values = serde_json::json!({"checkout.enabled": true});
/// let client = ClientConfig::local_only()
///     .baseline_values(values.as_object().unwrap().clone())
///     .to_client()
///     .unwrap();
///
/// assert!(client.feature_is_on("checkout.enabled", &ContextSet::new()).unwrap());
/// ```
pub struct Client {
    core: Arc<ClientCore>,
    sync_thread: Mutex<Option<ConfigSyncThread>>,
}

/// State shared between the client and its sync thread.
struct ClientCore {
    resolver: UpdatingConfigResolver,
    listeners: ListenerRegistry,
    ready: ReadyGate,
    ready_deadline: Instant,
    initialization_timeout: Duration,
    on_initialization_failure: OnInitializationFailure,
    telemetry_sink: Box<dyn TelemetrySink>,
    context_provider: Box<dyn ContextProvider + Send + Sync>,
}

impl Client {
    /// Create a new `Client` using the specified configuration.
    ///
    /// In remote mode, this starts a background thread that fetches configs and then follows the
    /// config stream. Local modes finish initialization before returning.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidLocalValue`] if baseline or override values are malformed.
    /// - [`Error::Io`] or [`Error::InvalidPayload`] if the snapshot file cannot be loaded.
    /// - [`Error::MissingSdkKey`] or [`Error::InvalidHostUrl`] in remote mode.
    pub fn new(config: ClientConfig) -> Result<Client> {
        Client::with_transport(config, ReqwestTransport::new())
    }

    pub(crate) fn with_transport<T: HttpTransport>(
        config: ClientConfig,
        transport: T,
    ) -> Result<Client> {
        let baseline = load_local_values(&config.baseline_values, "baseline")?;
        let overrides = load_local_values(&config.override_values, "overrides")?;
        let loader = ConfigLoader::new(baseline, overrides, config.global_context);

        let core = Arc::new(ClientCore {
            resolver: UpdatingConfigResolver::new(loader, config.env_lookup),
            listeners: ListenerRegistry::default(),
            ready: ReadyGate::default(),
            ready_deadline: Instant::now() + config.initialization_timeout,
            initialization_timeout: config.initialization_timeout,
            on_initialization_failure: config.on_initialization_failure,
            telemetry_sink: config.telemetry_sink,
            context_provider: config.context_provider,
        });
        for listener in config.listeners {
            core.listeners.add(listener);
        }

        let sync_thread = match config.data_source {
            DataSource::LocalOnly => {
                core.finish_initialization(Source::LocalOnly);
                None
            }
            DataSource::LocalFile(path) => {
                core.resolver.load_from_json_file(&path)?;
                core.finish_initialization(Source::LocalFile);
                None
            }
            DataSource::Remote => {
                if config.sdk_key.is_empty() {
                    return Err(Error::MissingSdkKey);
                }
                let http = HttpClient::new(
                    transport,
                    HttpClientConfig {
                        sdk_key: config.sdk_key,
                        api_hosts: parse_hosts(&config.api_hosts)?,
                        stream_hosts: parse_hosts(&config.stream_hosts)?,
                        request_timeout: config.request_timeout,
                        cache_capacity: config.cache_capacity,
                    },
                );
                Some(ConfigSyncThread::start(
                    http,
                    Arc::clone(&core),
                    config.stream_backoff,
                )?)
            }
        };

        Ok(Client {
            core,
            sync_thread: Mutex::new(sync_thread),
        })
    }

    /// Resolve `key` for `context`.
    ///
    /// Returns `Ok(None)` when the key is unknown or no rule matches. Waits for initialization
    /// first; see [`wait_for_ready`](Self::wait_for_ready).
    pub fn get(&self, key: &str, context: &ContextSet) -> Result<Option<ConfigValue>> {
        Ok(self.get_match(key, context)?.map(|result| result.value))
    }

    /// Resolve `key` for `context`, with details on where the value came from and which rule
    /// produced it.
    pub fn get_match(&self, key: &str, context: &ContextSet) -> Result<Option<Match>> {
        self.wait_for_ready()?;
        let lookup = self.lookup_context(context);
        Ok(self.core.resolve(key, &lookup))
    }

    /// Whether the flag `key` is on for `context`. Anything but `true` is off.
    pub fn feature_is_on(&self, key: &str, context: &ContextSet) -> Result<bool> {
        Ok(self
            .get(key, context)?
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }

    /// Resolve every known key for `context`. Keys without a matching rule are left out.
    pub fn get_all(&self, context: &ContextSet) -> Result<HashMap<String, ConfigValue>> {
        self.wait_for_ready()?;
        let lookup = self.lookup_context(context);
        Ok(self
            .core
            .resolver
            .keys()
            .into_iter()
            .filter_map(|key| {
                let value = self.core.resolve(&key, &lookup)?.value;
                Some((key, value))
            })
            .collect())
    }

    /// Keys of every known config, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        self.wait_for_ready()?;
        Ok(self.core.resolver.keys())
    }

    /// Whether initialization has finished (successfully or by unlocking).
    pub fn is_ready(&self) -> bool {
        matches!(self.core.ready.get(), Some(Ok(())))
    }

    /// Block until initialization finishes or the initialization timeout (counted from client
    /// creation) elapses.
    ///
    /// # Errors
    ///
    /// - [`Error::InitializationTimeout`] on timeout under [`OnInitializationFailure::Raise`].
    /// - [`Error::Unauthorized`] if the server rejected the sdk key before any configs loaded.
    /// - [`Error::SyncThreadPanicked`]
    pub fn wait_for_ready(&self) -> Result<()> {
        if let Some(result) = self.core.ready.wait_until(self.core.ready_deadline)? {
            return result;
        }

        match self.core.on_initialization_failure {
            OnInitializationFailure::Raise => Err(Error::InitializationTimeout {
                timeout: self.core.initialization_timeout,
            }),
            OnInitializationFailure::Unlock => {
                self.core.finish_initialization(Source::InitTimeout);
                Ok(())
            }
        }
    }

    /// Register a change listener. It receives events from every later update.
    pub fn add_listener(&self, listener: impl ConfigChangeListener + 'static) -> ListenerId {
        self.core.listeners.add(Arc::new(listener))
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.core.listeners.remove(id)
    }

    /// Highest config id loaded so far.
    pub fn highwater_mark(&self) -> i64 {
        self.core.resolver.highwater_mark()
    }

    /// Stop the sync thread and block waiting for it to exit. Resolution keeps working against the
    /// last loaded configs.
    pub fn shutdown(&self) -> Result<()> {
        let sync_thread = self
            .sync_thread
            .lock()
            .map_err(|_| Error::SyncThreadPanicked)?
            .take();
        if let Some(sync_thread) = sync_thread {
            sync_thread.shutdown()?;
        }
        Ok(())
    }

    fn lookup_context(&self, explicit: &ContextSet) -> LookupContext {
        let ambient = self.core.context_provider.ambient_context();
        self.core.resolver.lookup_context(&ambient, explicit)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Ok(Some(sync_thread)) = self.sync_thread.get_mut() {
            sync_thread.stop();
        }
    }
}

impl ClientCore {
    fn resolve(&self, key: &str, lookup: &LookupContext) -> Option<Match> {
        let result = self.resolver.get_match(key, lookup);
        self.telemetry_sink.report_match(key, result.as_ref(), lookup);
        result
    }

    /// Publish whatever is loaded and open the ready gate.
    fn finish_initialization(&self, source: Source) {
        let events = self.resolver.update();
        if self.ready.set(Ok(())) {
            let highwater = self.resolver.highwater_mark();
            match source {
                Source::InitTimeout => log::warn!(target: "reforge",
                    highwater;
                    "initialization timed out, continuing with the configs loaded so far"),
                _ => log::info!(target: "reforge",
                    source:? = source,
                    highwater;
                    "client initialized"),
            }
        }
        self.publish(&events);
    }

    fn publish(&self, events: &[ConfigChangeEvent]) {
        self.listeners.notify(events);
    }
}

impl ConfigSink for ClientCore {
    fn highwater_mark(&self) -> i64 {
        self.resolver.highwater_mark()
    }

    fn apply(&self, configs: &Configs, provenance: Provenance) {
        let previous = self.resolver.highwater_mark();
        let source = provenance.source;
        let highwater = self.resolver.load_configs(configs, provenance);
        if highwater > previous {
            log::info!(target: "reforge", source:? = source, highwater; "loaded new configs");
        }

        if self.ready.get().is_none() {
            self.finish_initialization(source);
        } else {
            let events = self.resolver.update();
            self.publish(&events);
        }
    }

    fn fail(&self, error: Error) {
        self.ready.set(Err(error));
    }
}

fn parse_hosts(hosts: &[String]) -> Result<Vec<url::Url>> {
    hosts.iter().map(|host| parse_host(host)).collect()
}

/// Holds `None` until initialization finishes, then `Some(Ok(()))`, or `Some(Err(...))` if syncing
/// failed for good before any configs were loaded. Set at most once.
#[derive(Default)]
struct ReadyGate {
    result: Mutex<Option<Result<()>>>,
    condvar: Condvar,
}

impl ReadyGate {
    fn get(&self) -> Option<Result<()>> {
        self.result
            .lock()
            .expect("thread holding ready lock should not panic")
            .clone()
    }

    /// Returns `true` if this call set the result.
    fn set(&self, result: Result<()>) -> bool {
        let mut lock = self
            .result
            .lock()
            .expect("thread holding ready lock should not panic");
        if lock.is_some() {
            return false;
        }
        *lock = Some(result);
        self.condvar.notify_all();
        true
    }

    /// Wait for the result until `deadline`. Returns `Ok(None)` on timeout.
    fn wait_until(&self, deadline: Instant) -> Result<Option<Result<()>>> {
        let mut lock = self
            .result
            .lock()
            .map_err(|_| Error::SyncThreadPanicked)?;
        loop {
            if let Some(result) = &*lock {
                return Ok(Some(result.clone()));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            lock = self
                .condvar
                .wait_timeout(lock, deadline - now)
                .map_err(|_| Error::SyncThreadPanicked)?
                .0;
        }
    }
}
