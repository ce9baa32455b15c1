//! A background thread that keeps the client in sync with the server: one bulk fetch to get the
//! initial configs, then the config stream for as long as the client lives.
use std::{sync::Arc, time::Duration};

use rand::{thread_rng, Rng};
use tokio::sync::watch;

use crate::{
    config::{Configs, Provenance, Source},
    transport::{HttpClient, HttpTransport, StreamingSubscriber},
    Error, Result,
};

/// Delay between reconnection attempts.
///
/// The delay doubles after every failed attempt, from `initial` up to `max`, and goes back to
/// `initial` once a connection has received any data. Up to `jitter` is subtracted from each delay
/// so that many processes do not reconnect in lockstep.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Upper bound of the doubled delay.
    pub max: Duration,
    /// Maximum random amount subtracted from each delay.
    pub jitter: Duration,
}

impl Backoff {
    /// Default value for [`Backoff::initial`].
    pub const DEFAULT_INITIAL: Duration = Duration::from_secs(1);
    /// Default value for [`Backoff::max`].
    pub const DEFAULT_MAX: Duration = Duration::from_secs(60);
    /// Default value for [`Backoff::jitter`].
    pub const DEFAULT_JITTER: Duration = Duration::from_millis(500);
}

impl Default for Backoff {
    fn default() -> Backoff {
        Backoff {
            initial: Backoff::DEFAULT_INITIAL,
            max: Backoff::DEFAULT_MAX,
            jitter: Backoff::DEFAULT_JITTER,
        }
    }
}

struct Delay<'a> {
    backoff: &'a Backoff,
    current: Duration,
}

impl<'a> Delay<'a> {
    fn new(backoff: &'a Backoff) -> Delay<'a> {
        Delay {
            backoff,
            current: backoff.initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = jitter(self.current, self.backoff.jitter);
        self.current = (self.current * 2).min(self.backoff.max.max(self.backoff.initial));
        delay
    }

    fn reset(&mut self) {
        self.current = self.backoff.initial;
    }
}

/// Where the sync thread delivers what it receives.
pub(crate) trait ConfigSink: Send + Sync + 'static {
    /// Highest config id seen so far; fetches and streams resume after it.
    fn highwater_mark(&self) -> i64;

    fn apply(&self, configs: &Configs, provenance: Provenance);

    /// The thread hit an unrecoverable error and is exiting.
    fn fail(&self, error: Error);
}

/// The config sync thread.
pub(crate) struct ConfigSyncThread {
    join_handle: std::thread::JoinHandle<()>,

    /// Used to send a stop command to the sync thread.
    stop_sender: watch::Sender<bool>,
}

impl ConfigSyncThread {
    pub(crate) fn start<T: HttpTransport, S: ConfigSink>(
        http: HttpClient<T>,
        sink: Arc<S>,
        backoff: Backoff,
    ) -> std::io::Result<ConfigSyncThread> {
        let (stop_sender, mut stop_receiver) = watch::channel(false);

        let join_handle = std::thread::Builder::new()
            .name("reforge-sync".to_owned())
            .spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    let runtime = match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => runtime,
                        Err(err) => {
                            sink.fail(Error::from(err));
                            return;
                        }
                    };

                    if let Err(err) =
                        runtime.block_on(run(&http, sink.as_ref(), &backoff, &mut stop_receiver))
                    {
                        log::warn!(target: "reforge", "config sync stopped: {err}");
                        sink.fail(err);
                    }
                }));

                if result.is_err() {
                    sink.fail(Error::SyncThreadPanicked);
                }
            })?;

        Ok(ConfigSyncThread {
            join_handle,
            stop_sender,
        })
    }

    /// Ask the thread to stop without waiting for it.
    pub(crate) fn stop(&self) {
        // Fails only when the thread has already exited.
        let _ = self.stop_sender.send(true);
    }

    /// Stop the thread and block waiting for it to exit.
    pub(crate) fn shutdown(self) -> Result<()> {
        self.stop();
        self.join_handle
            .join()
            .map_err(|_| Error::SyncThreadPanicked)?;
        Ok(())
    }
}

/// Fetch until the first success, then stream until stopped. Returns an error only when syncing
/// cannot recover.
async fn run<T: HttpTransport, S: ConfigSink + ?Sized>(
    http: &HttpClient<T>,
    sink: &S,
    backoff: &Backoff,
    stop: &mut watch::Receiver<bool>,
) -> Result<()> {
    let mut delay = Delay::new(backoff);

    loop {
        log::debug!(target: "reforge", "fetching configs");
        let result = tokio::select! {
            result = fetch(http, sink) => result,
            _ = stop.changed() => return Ok(()),
        };
        match result {
            Ok(()) => break,
            Err(err @ (Error::Unauthorized | Error::InvalidHostUrl { .. })) => return Err(err),
            Err(err) => {
                log::warn!(target: "reforge", "failed to fetch configs, will retry: {err}");
            }
        }
        if !sleep_or_stop(delay.next_delay(), stop).await {
            return Ok(());
        }
    }

    delay.reset();
    loop {
        let highwater = sink.highwater_mark();
        let mut subscriber = StreamingSubscriber::new(|configs: Configs| {
            sink.apply(&configs, Provenance::new(Source::Streaming));
        });

        let result = tokio::select! {
            result = subscriber.run(http, highwater) => result,
            _ = stop.changed() => return Ok(()),
        };
        match result {
            Ok(()) => {}
            Err(err @ (Error::Unauthorized | Error::InvalidHostUrl { .. })) => return Err(err),
            Err(err) => {
                log::warn!(target: "reforge", highwater; "config stream failed: {err}");
            }
        }

        if subscriber.has_received_data() {
            delay.reset();
        }
        let wait = delay.next_delay();
        log::debug!(target: "reforge", wait:? = wait; "reconnecting to config stream");
        if !sleep_or_stop(wait, stop).await {
            return Ok(());
        }
    }
}

async fn fetch<T: HttpTransport, S: ConfigSink + ?Sized>(
    http: &HttpClient<T>,
    sink: &S,
) -> Result<()> {
    let response = http.request_configs(sink.highwater_mark()).await?;
    let configs = response.configs()?;
    log::debug!(target: "reforge",
        uri = response.uri.as_str(),
        cache_status:? = response.cache_status;
        "fetched configs");
    sink.apply(
        &configs,
        Provenance::with_location(Source::RemoteApi, response.uri.clone()),
    );
    Ok(())
}

/// Returns `false` if stopped before `duration` elapsed.
async fn sleep_or_stop(duration: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = stop.changed() => false,
    }
}

/// Subtract a random jitter of up to `jitter` from `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    let jitter = jitter.min(interval);
    if jitter.is_zero() {
        return interval;
    }
    interval - thread_rng().gen_range(Duration::ZERO..jitter)
}
