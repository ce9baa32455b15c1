use std::{sync::Arc, time::Duration};

/// Represents a result type for operations in the Reforge SDK.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// reforge-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the Reforge SDK.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The client did not become ready within the configured initialization timeout and the
    /// initialization failure policy is [`OnInitializationFailure::Raise`].
    ///
    /// [`OnInitializationFailure::Raise`]: crate::OnInitializationFailure::Raise
    #[error("client did not initialize within {timeout:?}")]
    InitializationTimeout {
        /// Configured initialization timeout.
        timeout: Duration,
    },

    /// Remote mode requires an SDK key.
    #[error("sdk key is not set")]
    MissingSdkKey,

    /// Invalid api or stream host.
    #[error("invalid host url: {host}")]
    InvalidHostUrl {
        /// The offending host.
        host: String,
        /// Why the host failed to parse.
        #[source]
        source: url::ParseError,
    },

    /// The request was unauthorized, possibly due to an invalid SDK key.
    #[error("unauthorized, sdk_key is likely invalid")]
    Unauthorized,

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// A request did not complete within the request timeout.
    #[error("request to {uri} timed out")]
    RequestTimeout {
        /// Request URI.
        uri: String,
    },

    /// Every host in the failover list failed with a transport error.
    #[error("all {attempts} hosts failed, last error: {last_error}")]
    HostsExhausted {
        /// Number of hosts that were tried.
        attempts: usize,
        /// Description of the last failure.
        last_error: String,
    },

    /// The server answered with a status code that cannot be used.
    #[error("unexpected response status {status} from {uri}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Request URI.
        uri: String,
    },

    /// A configuration payload with no bytes was received or served from cache.
    #[error("zero-byte config data is not valid")]
    ZeroByteConfig,

    /// A configuration payload could not be parsed.
    #[error("invalid config payload")]
    InvalidPayload(#[source] Arc<serde_json::Error>),

    /// A streaming frame was not valid base64.
    #[error("invalid base64 in stream frame")]
    InvalidBase64(#[source] base64::DecodeError),

    /// A locally supplied value could not be converted into a config value.
    #[error("invalid local value for {key}: {reason}")]
    InvalidLocalValue {
        /// Config key the value was supplied for.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Indicates that the sync thread panicked. This should normally never happen.
    #[error("config sync thread panicked")]
    SyncThreadPanicked,
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::InvalidPayload(Arc::new(value))
    }
}

impl From<base64::DecodeError> for Error {
    fn from(value: base64::DecodeError) -> Self {
        Error::InvalidBase64(value)
    }
}
