//! HTTP event-stream transport
//!
//! Opens `GET {endpoint}?{param}={query}` with `Accept: text/event-stream`
//! and pumps the body through [`SseDecoder`] on a background task. Closing
//! the connection cancels that task.

use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::sse::SseDecoder;
use super::{Connection, EventSink, Transport, TransportError, TransportEvent};

/// Transport backed by a streaming HTTP GET
pub struct HttpSseTransport {
    client: reqwest::Client,
    endpoint: Url,
    query_param: String,
}

impl HttpSseTransport {
    pub fn new(
        endpoint: Url,
        query_param: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint,
            query_param: query_param.into(),
        })
    }

    /// Stream URL for a query. The query is form-encoded into the query string.
    pub fn request_url(&self, query: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair(&self.query_param, query);
        url
    }
}

impl Transport for HttpSseTransport {
    fn open(&self, query: &str, sink: EventSink) -> Result<Box<dyn Connection>, TransportError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let url = self.request_url(query);
        let client = self.client.clone();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let session = sink.session();

        info!(session = %session, url = %url, "Opening event stream");
        runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => {
                    debug!(session = %session, "Event stream task cancelled");
                }
                result = pump_stream(client, url, &sink) => {
                    match result {
                        Ok(()) => {
                            sink.send(TransportEvent::Ended);
                        }
                        Err(e) => {
                            let reason = format!("{:#}", e);
                            warn!(session = %session, error = %reason, "Event stream failed");
                            sink.send(TransportEvent::Error(reason));
                        }
                    }
                }
            }
        });

        Ok(Box::new(HttpConnection {
            token,
            closed: false,
        }))
    }
}

/// Read the response body and forward every named frame
async fn pump_stream(client: reqwest::Client, url: Url, sink: &EventSink) -> anyhow::Result<()> {
    let response = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await
        .context("failed to connect to pipeline backend")?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("pipeline backend returned {}", status);
    }
    sink.send(TransportEvent::Opened);

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("event stream read failed")?;
        for frame in decoder.push(&chunk) {
            let Some(name) = frame.event else {
                debug!("Dropping unnamed SSE frame ({} bytes)", frame.data.len());
                continue;
            };
            if !sink.send(TransportEvent::Named {
                name,
                data: frame.data,
            }) {
                // Nobody is listening anymore
                return Ok(());
            }
        }
    }
    decoder.finish();
    Ok(())
}

/// Open HTTP stream, released by cancelling its reader task
struct HttpConnection {
    token: CancellationToken,
    closed: bool,
}

impl Connection for HttpConnection {
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.token.cancel();
        debug!("Event stream connection closed");
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for HttpConnection {
    fn drop(&mut self) {
        self.close();
    }
}
