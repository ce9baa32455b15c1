//! Scripted in-memory transport for tests.
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use tokio::sync::mpsc;

use super::{HttpRequest, HttpResponse, HttpTransport, StreamResponse};
use crate::{Error, Result};

enum ScriptedStream {
    Chunks {
        chunks: Vec<Result<Vec<u8>>>,
        keep_open: bool,
    },
    Status(u16),
}

/// Replays queued responses in order and records every request.
///
/// Clones share the same script, so a test can keep a handle after moving the transport into an
/// [`HttpClient`](super::HttpClient).
#[derive(Default, Clone)]
pub(crate) struct ScriptedTransport {
    gets: Arc<Mutex<VecDeque<Result<HttpResponse>>>>,
    streams: Arc<Mutex<VecDeque<ScriptedStream>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    open_senders: Arc<Mutex<Vec<mpsc::Sender<Result<Vec<u8>>>>>>,
}

pub(crate) fn ok(response: HttpResponse) -> Result<HttpResponse> {
    Ok(response)
}

pub(crate) fn response(status: u16, headers: &[(&str, &str)], body: &[u8]) -> HttpResponse {
    HttpResponse {
        status,
        headers: headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
            .collect::<HashMap<_, _>>(),
        body: body.to_vec(),
    }
}

impl ScriptedTransport {
    pub(crate) fn new() -> ScriptedTransport {
        ScriptedTransport::default()
    }

    pub(crate) fn push_get(&self, response: Result<HttpResponse>) {
        self.gets.lock().unwrap().push_back(response);
    }

    /// Queue a `200` stream that yields `chunks` and then closes.
    pub(crate) fn push_stream(&self, chunks: Vec<Result<Vec<u8>>>) {
        self.streams.lock().unwrap().push_back(ScriptedStream::Chunks {
            chunks,
            keep_open: false,
        });
    }

    /// Queue a `200` stream that yields `chunks` and then stays open.
    pub(crate) fn push_open_stream(&self, chunks: Vec<Result<Vec<u8>>>) {
        self.streams.lock().unwrap().push_back(ScriptedStream::Chunks {
            chunks,
            keep_open: true,
        });
    }

    /// Queue a stream response that fails with `status` before any data.
    pub(crate) fn push_stream_status(&self, status: u16) {
        self.streams
            .lock()
            .unwrap()
            .push_back(ScriptedStream::Status(status));
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Value of `name` on the `index`th recorded request.
    pub(crate) fn header(&self, index: usize, name: &str) -> Option<String> {
        self.requests.lock().unwrap().get(index).and_then(|request| {
            request
                .headers
                .iter()
                .find(|(header, _)| header == name)
                .map(|(_, value)| value.clone())
        })
    }

    fn record(&self, request: &HttpRequest) {
        self.requests.lock().unwrap().push(request.clone());
    }
}

impl HttpTransport for ScriptedTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.record(&request);
        self.gets
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(Error::RequestTimeout {
                    uri: request.url.to_string(),
                })
            })
    }

    async fn open_stream(&self, request: HttpRequest) -> Result<StreamResponse> {
        self.record(&request);
        let next = self.streams.lock().unwrap().pop_front();
        match next {
            Some(ScriptedStream::Chunks { chunks, keep_open }) => {
                let (sender, receiver) = mpsc::channel(chunks.len().max(1));
                for chunk in chunks {
                    let _ = sender.try_send(chunk);
                }
                if keep_open {
                    self.open_senders.lock().unwrap().push(sender);
                }
                Ok(StreamResponse {
                    status: 200,
                    chunks: receiver,
                })
            }
            Some(ScriptedStream::Status(status)) => {
                let (_, receiver) = mpsc::channel(1);
                Ok(StreamResponse {
                    status,
                    chunks: receiver,
                })
            }
            None => Err(Error::RequestTimeout {
                uri: request.url.to_string(),
            }),
        }
    }
}
