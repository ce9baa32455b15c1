use std::{collections::HashMap, future::Future, time::Duration};

use tokio::sync::mpsc;
use url::Url;

use crate::{Error, Result};

/// Buffered chunks between the stream reader task and the consumer.
const STREAM_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct HttpRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
    /// For plain requests, the whole request. For streams, only establishing the connection.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Lookup a header by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// A long-lived response whose body arrives in chunks.
#[derive(Debug)]
pub struct StreamResponse {
    /// Status of the response that opened the stream.
    pub status: u16,
    /// Body chunks. The channel closes when the server ends the stream; an `Err` item reports a
    /// broken connection.
    pub chunks: mpsc::Receiver<Result<Vec<u8>>>,
}

/// The I/O seam of the transport layer.
pub trait HttpTransport: Send + Sync + 'static {
    /// Perform a GET request and read the whole body.
    fn get(&self, request: HttpRequest) -> impl Future<Output = Result<HttpResponse>> + Send;

    /// Perform a GET request and stream the body.
    fn open_stream(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<StreamResponse>> + Send;
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a fresh `reqwest` client.
    pub fn new() -> ReqwestTransport {
        ReqwestTransport::default()
    }

    fn request(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = self.client.get(request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder
    }
}

fn lowercase_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            Some((name.as_str().to_ascii_lowercase(), value.to_str().ok()?.to_owned()))
        })
        .collect()
}

impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self
            .request(&request)
            .timeout(request.timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = lowercase_headers(response.headers());
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn open_stream(&self, request: HttpRequest) -> Result<StreamResponse> {
        let mut response = tokio::time::timeout(request.timeout, self.request(&request).send())
            .await
            .map_err(|_| Error::RequestTimeout {
                uri: request.url.to_string(),
            })??;

        let status = response.status().as_u16();
        let (sender, chunks) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            loop {
                let item = match response.chunk().await {
                    Ok(Some(chunk)) => Ok(chunk.to_vec()),
                    Ok(None) => return,
                    Err(err) => Err(Error::from(err)),
                };
                let failed = item.is_err();
                if sender.send(item).await.is_err() || failed {
                    // Receiver dropped or the connection broke.
                    return;
                }
            }
        });

        Ok(StreamResponse { status, chunks })
    }
}
