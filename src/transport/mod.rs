//! Network transport: config fetches with failover and caching, and the config stream.
mod cache;
mod http_client;
mod http_transport;
mod sse;
mod streaming;
#[cfg(test)]
pub(crate) mod testing;

pub use http_client::{CacheStatus, ConfigsResponse, HttpClient, HttpClientConfig};
pub use http_transport::{
    HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, StreamResponse,
};
pub(crate) use streaming::StreamingSubscriber;
