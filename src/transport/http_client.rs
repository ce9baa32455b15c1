//! An HTTP client that fetches configs from the server with host failover and response caching.
use std::{sync::Arc, time::Duration, time::Instant};

use base64::Engine;
use url::Url;

use super::{
    cache::ResponseCache, HttpRequest, HttpResponse, HttpTransport, StreamResponse,
};
use crate::{config::Configs, Error, Result};

const CONFIGS_ENDPOINT: &str = "api/v2/configs";
const STREAM_ENDPOINT: &str = "api/v2/sse/config";
const SDK_VERSION_HEADER: &str = "X-Reforge-SDK-Version";

/// Settings for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Sent as basic-auth password.
    pub sdk_key: String,
    /// Hosts for config fetches, in priority order.
    pub api_hosts: Vec<Url>,
    /// Hosts for the config stream, in priority order.
    pub stream_hosts: Vec<Url>,
    /// Timeout of a single fetch, or of establishing a stream.
    pub request_timeout: Duration,
    /// Maximum number of cached responses.
    pub cache_capacity: usize,
}

/// Whether a response was served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// A successful config fetch.
#[derive(Debug, Clone)]
pub struct ConfigsResponse {
    /// Effective status. Revalidated cache hits report `200`.
    pub status: u16,
    /// Whether the body came from the cache.
    pub cache_status: CacheStatus,
    /// URI that answered.
    pub uri: String,
    /// Raw response body. Parse with [`ConfigsResponse::configs`].
    pub body: Arc<[u8]>,
}

impl ConfigsResponse {
    /// Parse the body. Zero-byte bodies are invalid, whether fresh or cached.
    pub fn configs(&self) -> Result<Configs> {
        if self.body.is_empty() {
            return Err(Error::ZeroByteConfig);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// A client that fetches configs from a prioritized list of hosts.
pub struct HttpClient<T> {
    transport: T,
    config: HttpClientConfig,
    cache: ResponseCache,
}

impl<T: HttpTransport> HttpClient<T> {
    /// Create a client with an empty response cache.
    pub fn new(transport: T, config: HttpClientConfig) -> HttpClient<T> {
        let cache = ResponseCache::new(config.cache_capacity);
        HttpClient {
            transport,
            config,
            cache,
        }
    }

    /// Fetch configs newer than `since_id`.
    ///
    /// Each host is tried once, in order. A fresh cache entry answers without a network call. A
    /// `401` fails immediately. Other failures move on to the next host.
    pub async fn request_configs(&self, since_id: i64) -> Result<ConfigsResponse> {
        let path = format!("{CONFIGS_ENDPOINT}/{since_id}");
        let mut last_error = None;

        for host in &self.config.api_hosts {
            let url = endpoint(host, &path)?;
            let uri = url.to_string();

            let cached = self.cache.get(&uri);
            if let Some(entry) = cached.as_ref().filter(|e| e.is_fresh(Instant::now())) {
                log::debug!(target: "reforge", uri = uri.as_str(); "serving configs from cache");
                return Ok(ConfigsResponse {
                    status: 200,
                    cache_status: CacheStatus::Hit,
                    uri,
                    body: entry.body.clone(),
                });
            }

            let mut headers = self.auth_headers();
            if let Some(etag) = cached.as_ref().and_then(|e| e.etag.clone()) {
                headers.push(("If-None-Match".to_owned(), etag));
            }

            log::debug!(target: "reforge", uri = uri.as_str(); "fetching configs");
            let result = self
                .transport
                .get(HttpRequest {
                    url,
                    headers,
                    timeout: self.config.request_timeout,
                })
                .await;

            let error = match result {
                Ok(response) if response.status == 401 => {
                    log::warn!(target: "reforge", "client is not authorized. Check your sdk key");
                    return Err(Error::Unauthorized);
                }
                Ok(response) if (200..300).contains(&response.status) => {
                    self.cache.store(&uri, &response, Instant::now());
                    return Ok(ConfigsResponse {
                        status: response.status,
                        cache_status: CacheStatus::Miss,
                        uri,
                        body: Arc::from(response.body),
                    });
                }
                Ok(response) if response.status == 304 => match cached {
                    Some(entry) => {
                        self.cache.revalidated(&uri, &response, Instant::now());
                        return Ok(ConfigsResponse {
                            status: 200,
                            cache_status: CacheStatus::Hit,
                            uri,
                            body: entry.body,
                        });
                    }
                    None => unexpected_status(&response, &uri),
                },
                Ok(response) => unexpected_status(&response, &uri),
                Err(err) => err,
            };

            log::warn!(target: "reforge", uri = uri.as_str(); "failed to fetch configs: {error}");
            last_error = Some(error);
        }

        Err(exhausted(self.config.api_hosts.len(), last_error))
    }

    /// Open the config stream, resuming after `highwater`.
    pub async fn open_config_stream(&self, highwater: i64) -> Result<StreamResponse> {
        let mut last_error = None;

        for host in &self.config.stream_hosts {
            let url = endpoint(host, STREAM_ENDPOINT)?;
            let uri = url.to_string();

            let mut headers = self.auth_headers();
            headers.push(("Last-Event-ID".to_owned(), highwater.to_string()));
            headers.push(("Accept".to_owned(), "text/event-stream".to_owned()));

            let result = self
                .transport
                .open_stream(HttpRequest {
                    url,
                    headers,
                    timeout: self.config.request_timeout,
                })
                .await;

            let error = match result {
                Ok(stream) if stream.status == 401 => {
                    log::warn!(target: "reforge", "client is not authorized. Check your sdk key");
                    return Err(Error::Unauthorized);
                }
                Ok(stream) if (200..300).contains(&stream.status) => {
                    log::info!(target: "reforge", uri = uri.as_str(), highwater; "connected to config stream");
                    return Ok(stream);
                }
                Ok(stream) => Error::UnexpectedStatus {
                    status: stream.status,
                    uri: uri.clone(),
                },
                Err(err) => err,
            };

            log::warn!(target: "reforge", uri = uri.as_str(); "failed to open config stream: {error}");
            last_error = Some(error);
        }

        Err(exhausted(self.config.stream_hosts.len(), last_error))
    }

    /// Number of cached responses.
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Drop every cached response.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn auth_headers(&self) -> Vec<(String, String)> {
        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("authuser:{}", self.config.sdk_key));
        vec![
            ("Authorization".to_owned(), format!("Basic {credentials}")),
            (
                SDK_VERSION_HEADER.to_owned(),
                format!("rust-{}", env!("CARGO_PKG_VERSION")),
            ),
        ]
    }
}

fn endpoint(host: &Url, path: &str) -> Result<Url> {
    // `join` replaces the last path segment unless the base ends with a slash.
    let mut base = host.clone();
    if !base.path().ends_with('/') {
        base.set_path(&format!("{}/", base.path()));
    }
    base.join(path).map_err(|source| Error::InvalidHostUrl {
        host: host.to_string(),
        source,
    })
}

fn unexpected_status(response: &HttpResponse, uri: &str) -> Error {
    Error::UnexpectedStatus {
        status: response.status,
        uri: uri.to_owned(),
    }
}

fn exhausted(attempts: usize, last_error: Option<Error>) -> Error {
    Error::HostsExhausted {
        attempts,
        last_error: last_error.map_or_else(|| "no hosts configured".to_owned(), |e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use url::Url;

    use super::{CacheStatus, HttpClient, HttpClientConfig};
    use crate::{
        transport::testing::{ok, response, ScriptedTransport},
        Error,
    };

    fn client(transport: ScriptedTransport) -> HttpClient<ScriptedTransport> {
        HttpClient::new(
            transport,
            HttpClientConfig {
                sdk_key: "test-key".to_owned(),
                api_hosts: vec![
                    Url::parse("https://primary.test").unwrap(),
                    Url::parse("https://secondary.test/base").unwrap(),
                ],
                stream_hosts: vec![Url::parse("https://stream.test").unwrap()],
                request_timeout: Duration::from_secs(1),
                cache_capacity: 8,
            },
        )
    }

    const CONFIGS: &[u8] = br#"{"configServicePointer": {"projectEnvId": 1, "highestId": 3}, "configs": []}"#;

    #[tokio::test]
    async fn fails_over_to_next_host() {
        let transport = ScriptedTransport::new();
        transport.push_get(Err(Error::RequestTimeout {
            uri: "https://primary.test/".to_owned(),
        }));
        transport.push_get(ok(response(200, &[], CONFIGS)));
        let client = client(transport);

        let response = client.request_configs(0).await.unwrap();

        assert_eq!(response.uri, "https://secondary.test/base/api/v2/configs/0");
        assert_eq!(response.cache_status, CacheStatus::Miss);
        assert!(response.configs().is_ok());

        let requests = client.transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url.as_str(), "https://primary.test/api/v2/configs/0");
        let auth = requests[0]
            .headers
            .iter()
            .find(|(name, _)| name == "Authorization")
            .map(|(_, value)| value.as_str());
        // base64("authuser:test-key")
        assert_eq!(auth, Some("Basic YXV0aHVzZXI6dGVzdC1rZXk="));
    }

    #[tokio::test]
    async fn non_success_status_fails_over() {
        let transport = ScriptedTransport::new();
        transport.push_get(ok(response(503, &[], b"")));
        transport.push_get(ok(response(200, &[], CONFIGS)));
        let client = client(transport);

        assert!(client.request_configs(0).await.is_ok());
    }

    #[tokio::test]
    async fn exhausted_hosts() {
        let transport = ScriptedTransport::new();
        transport.push_get(ok(response(500, &[], b"")));
        transport.push_get(ok(response(502, &[], b"")));
        let client = client(transport);

        assert!(matches!(
            client.request_configs(0).await,
            Err(Error::HostsExhausted { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn stream_fails_over_to_next_host() {
        let transport = ScriptedTransport::new();
        transport.push_stream_status(503);
        transport.push_open_stream(vec![]);
        let client = HttpClient::new(
            transport,
            HttpClientConfig {
                sdk_key: "test-key".to_owned(),
                api_hosts: vec![Url::parse("https://primary.test").unwrap()],
                stream_hosts: vec![
                    Url::parse("https://stream-a.test").unwrap(),
                    Url::parse("https://stream-b.test").unwrap(),
                ],
                request_timeout: Duration::from_secs(1),
                cache_capacity: 8,
            },
        );

        let stream = client.open_config_stream(12).await.unwrap();
        assert_eq!(stream.status, 200);

        let requests = client.transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url.host_str(), Some("stream-a.test"));
        assert_eq!(requests[1].url.host_str(), Some("stream-b.test"));
        assert_eq!(
            client.transport.header(1, "Last-Event-ID").as_deref(),
            Some("12")
        );
        assert_eq!(
            client.transport.header(1, "Accept").as_deref(),
            Some("text/event-stream")
        );
    }

    #[tokio::test]
    async fn stream_hosts_exhausted() {
        let transport = ScriptedTransport::new();
        transport.push_stream_status(500);
        let client = client(transport);

        assert!(matches!(
            client.open_config_stream(0).await,
            Err(Error::HostsExhausted { attempts: 1, .. })
        ));
    }

    #[tokio::test]
    async fn unauthorized_does_not_fail_over() {
        let transport = ScriptedTransport::new();
        transport.push_get(ok(response(401, &[], b"")));
        let client = client(transport);

        assert!(matches!(
            client.request_configs(0).await,
            Err(Error::Unauthorized)
        ));
        assert_eq!(client.transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn fresh_entry_is_a_hit_without_network() {
        let transport = ScriptedTransport::new();
        transport.push_get(ok(response(
            200,
            &[("Cache-Control", "max-age=60"), ("ETag", "abc")],
            CONFIGS,
        )));
        let client = client(transport);

        let first = client.request_configs(0).await.unwrap();
        let second = client.request_configs(0).await.unwrap();

        assert_eq!(first.cache_status, CacheStatus::Miss);
        assert_eq!(second.cache_status, CacheStatus::Hit);
        assert_eq!(second.body, first.body);
        assert_eq!(client.transport.requests().len(), 1);
        assert_eq!(client.cache_size(), 1);
    }

    #[tokio::test]
    async fn not_modified_serves_cached_body() {
        let transport = ScriptedTransport::new();
        transport.push_get(ok(response(
            200,
            &[("Cache-Control", "no-cache"), ("ETag", "etag-no-cache")],
            CONFIGS,
        )));
        transport.push_get(ok(response(304, &[], b"")));
        let client = client(transport);

        let first = client.request_configs(0).await.unwrap();
        let second = client.request_configs(0).await.unwrap();

        assert_eq!(first.cache_status, CacheStatus::Miss);
        assert_eq!(second.cache_status, CacheStatus::Hit);
        assert_eq!(second.status, 200);
        assert_eq!(&*second.body, CONFIGS);

        let requests = client.transport.requests();
        assert!(requests[1]
            .headers
            .contains(&("If-None-Match".to_owned(), "etag-no-cache".to_owned())));
    }

    #[tokio::test]
    async fn not_modified_without_cache_entry_is_invalid() {
        let transport = ScriptedTransport::new();
        transport.push_get(ok(response(304, &[], b"")));
        transport.push_get(ok(response(304, &[], b"")));
        let client = client(transport);

        assert!(client.request_configs(0).await.is_err());
    }

    #[tokio::test]
    async fn zero_byte_bodies_are_rejected() {
        let transport = ScriptedTransport::new();
        transport.push_get(ok(response(200, &[("Cache-Control", "max-age=60")], b"")));
        let client = client(transport);

        let fresh = client.request_configs(0).await.unwrap();
        assert!(matches!(fresh.configs(), Err(Error::ZeroByteConfig)));

        let cached = client.request_configs(0).await.unwrap();
        assert_eq!(cached.cache_status, CacheStatus::Hit);
        assert!(matches!(cached.configs(), Err(Error::ZeroByteConfig)));
    }

    #[tokio::test]
    async fn zero_byte_via_not_modified_is_rejected() {
        let transport = ScriptedTransport::new();
        transport.push_get(ok(response(200, &[("Cache-Control", "no-cache"), ("ETag", "e")], b"")));
        transport.push_get(ok(response(304, &[], b"")));
        let client = client(transport);

        client.request_configs(0).await.unwrap();
        let revalidated = client.request_configs(0).await.unwrap();
        assert_eq!(revalidated.cache_status, CacheStatus::Hit);
        assert!(matches!(revalidated.configs(), Err(Error::ZeroByteConfig)));
    }

    #[tokio::test]
    async fn clear_cache_forces_refetch() {
        let transport = ScriptedTransport::new();
        transport.push_get(ok(response(200, &[("Cache-Control", "max-age=60")], CONFIGS)));
        transport.push_get(ok(response(200, &[("Cache-Control", "max-age=60")], CONFIGS)));
        let client = client(transport);

        client.request_configs(0).await.unwrap();
        assert_eq!(client.cache_size(), 1);

        client.clear_cache();
        assert_eq!(client.cache_size(), 0);

        let response = client.request_configs(0).await.unwrap();
        assert_eq!(response.cache_status, CacheStatus::Miss);
    }

    #[tokio::test]
    async fn stream_request_headers() {
        let transport = ScriptedTransport::new();
        transport.push_stream(vec![]);
        let client = client(transport);

        let stream = client.open_config_stream(42).await.unwrap();
        assert_eq!(stream.status, 200);

        let requests = client.transport.requests();
        assert_eq!(requests[0].url.as_str(), "https://stream.test/api/v2/sse/config");
        assert!(requests[0]
            .headers
            .contains(&("Last-Event-ID".to_owned(), "42".to_owned())));
        assert!(requests[0]
            .headers
            .contains(&("Accept".to_owned(), "text/event-stream".to_owned())));
    }
}
