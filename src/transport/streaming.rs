//! Consumes the config stream: decodes frames and forwards real config batches.
use base64::Engine;

use super::{sse::SseParser, HttpClient, HttpTransport};
use crate::{config::Configs, Result};

/// Turns stream frames into config batches for `consumer`.
///
/// Frames that decode to nothing, to whitespace, or to a batch without a service pointer
/// (keep-alives) are ignored. Malformed frames are logged and dropped. Every frame, including
/// ignored ones, counts as data received.
pub(crate) struct StreamingSubscriber<F> {
    consumer: F,
    has_received_data: bool,
}

impl<F: FnMut(Configs)> StreamingSubscriber<F> {
    pub(crate) fn new(consumer: F) -> StreamingSubscriber<F> {
        StreamingSubscriber {
            consumer,
            has_received_data: false,
        }
    }

    pub(crate) fn has_received_data(&self) -> bool {
        self.has_received_data
    }

    pub(crate) fn on_next(&mut self, data: &str) {
        self.has_received_data = true;

        match decode_frame(data) {
            Ok(Some(configs)) => {
                log::debug!(target: "reforge", configs = configs.configs.len(); "received configs from stream");
                (self.consumer)(configs);
            }
            Ok(None) => {
                log::debug!(target: "reforge", "ignoring empty or keep-alive stream frame");
            }
            Err(err) => {
                log::warn!(target: "reforge", "dropping malformed stream frame: {err}");
            }
        }
    }

    /// Open the stream at `highwater` and feed every event to [`on_next`](Self::on_next) until the
    /// server closes it or the connection breaks.
    pub(crate) async fn run<T: HttpTransport>(
        &mut self,
        http: &HttpClient<T>,
        highwater: i64,
    ) -> Result<()> {
        let mut stream = http.open_config_stream(highwater).await?;
        let mut parser = SseParser::default();

        while let Some(chunk) = stream.chunks.recv().await {
            for event in parser.feed(&chunk?) {
                log::trace!(target: "reforge", id:? = event.id, event:? = event.event; "stream event");
                self.on_next(&event.data);
            }
        }

        log::info!(target: "reforge", "config stream closed by server");
        Ok(())
    }
}

fn decode_frame(data: &str) -> Result<Option<Configs>> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(data.trim())?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let configs: Configs = serde_json::from_slice(&bytes)?;
    if configs.config_service_pointer.is_none() {
        return Ok(None);
    }
    Ok(Some(configs))
}
