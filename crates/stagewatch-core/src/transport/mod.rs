//! Transport boundary
//!
//! A transport opens one named-event stream per query and delivers what it
//! receives as messages tagged with the id of the session that opened it.
//! The connection handle it returns is owned by that session.

pub mod http;
pub mod sse;

use tokio::sync::mpsc;

use crate::session::SessionId;

pub use http::HttpSseTransport;
pub use sse::{SseDecoder, SseFrame};

/// What a connection reports while it is open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Stream accepted by the backend
    Opened,
    /// Named event with its raw payload
    Named { name: String, data: String },
    /// Stream failed
    Error(String),
    /// Stream closed by the backend
    Ended,
}

/// Transport event tagged with its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    pub session: SessionId,
    pub event: TransportEvent,
}

/// Sending half handed to a transport, bound to one session
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<TransportMessage>,
}

impl EventSink {
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<TransportMessage>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Deliver an event. Returns false once the receiving side is gone.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TransportMessage {
                session: self.session,
                event,
            })
            .is_ok()
    }
}

/// Handle to an open stream
pub trait Connection: Send {
    /// Release the stream. Calling it again is a no-op.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Opens named-event streams
pub trait Transport {
    fn open(&self, query: &str, sink: EventSink) -> Result<Box<dyn Connection>, TransportError>;
}

/// Errors opening a stream
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
    #[error("no async runtime available to drive the stream")]
    NoRuntime,
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording transport for session and client tests

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Connection that counts how often it is released
    pub struct RecordingConnection {
        closes: Arc<AtomicUsize>,
    }

    impl RecordingConnection {
        pub fn new() -> (Self, Arc<AtomicUsize>) {
            let closes = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    closes: closes.clone(),
                },
                closes,
            )
        }
    }

    impl Connection for RecordingConnection {
        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }

        fn is_closed(&self) -> bool {
            self.closes.load(Ordering::SeqCst) > 0
        }
    }

    /// One stream opened through [`RecordingTransport`]
    #[derive(Clone)]
    pub struct OpenedStream {
        pub query: String,
        pub sink: EventSink,
        pub closes: Arc<AtomicUsize>,
    }

    impl OpenedStream {
        pub fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }

        pub fn named(&self, name: &str, data: &str) -> bool {
            self.sink.send(TransportEvent::Named {
                name: name.to_string(),
                data: data.to_string(),
            })
        }
    }

    /// Transport that records every open and never touches the network
    #[derive(Clone, Default)]
    pub struct RecordingTransport {
        opened: Arc<Mutex<Vec<OpenedStream>>>,
        refuse: Arc<Mutex<bool>>,
    }

    impl RecordingTransport {
        pub fn opened(&self) -> Vec<OpenedStream> {
            self.opened.lock().unwrap().clone()
        }

        pub fn stream(&self, index: usize) -> OpenedStream {
            self.opened.lock().unwrap()[index].clone()
        }

        pub fn refuse_connections(&self, refuse: bool) {
            *self.refuse.lock().unwrap() = refuse;
        }
    }

    impl Transport for RecordingTransport {
        fn open(
            &self,
            query: &str,
            sink: EventSink,
        ) -> Result<Box<dyn Connection>, TransportError> {
            if *self.refuse.lock().unwrap() {
                return Err(TransportError::InvalidEndpoint("refused".to_string()));
            }
            let (connection, closes) = RecordingConnection::new();
            self.opened.lock().unwrap().push(OpenedStream {
                query: query.to_string(),
                sink,
                closes,
            });
            Ok(Box::new(connection))
        }
    }
}
