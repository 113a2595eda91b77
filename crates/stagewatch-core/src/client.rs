//! Query client
//!
//! Keeps at most one session open. Transports deliver events over a channel
//! tagged with the session id; the client applies them on its own task and
//! publishes a snapshot after every change. Messages from a session that has
//! since been replaced are dropped.

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::session::{Session, SessionId, SessionSnapshot};
use crate::stages::{progress, StageCatalog, StageProgress};
use crate::transport::{EventSink, Transport, TransportEvent, TransportMessage};

/// Single-session controller over a transport
pub struct QueryClient<T: Transport> {
    catalog: StageCatalog,
    transport: T,
    session: Option<Session>,
    next_id: u64,
    /// Sending half cloned into each session's sink
    tx: mpsc::UnboundedSender<TransportMessage>,
    rx: mpsc::UnboundedReceiver<TransportMessage>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl<T: Transport> QueryClient<T> {
    pub fn new(catalog: StageCatalog, transport: T) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            catalog,
            transport,
            session: None,
            next_id: 1,
            tx,
            rx,
            snapshot_tx,
        }
    }

    /// Submit a query.
    ///
    /// Blank queries are ignored and return `None`. Otherwise any open
    /// session is closed first and a fresh, empty session is published
    /// before its first event can be applied.
    pub fn start(&mut self, query: &str) -> Option<SessionId> {
        let query = query.trim();
        if query.is_empty() {
            debug!("Ignoring blank query");
            return None;
        }

        if let Some(mut previous) = self.session.take() {
            previous.close();
        }

        let id = SessionId::new(self.next_id);
        self.next_id += 1;
        let terminal = self.catalog.terminal().clone();
        let sink = EventSink::new(id, self.tx.clone());

        let session = match self.transport.open(query, sink) {
            Ok(connection) => Session::open(id, query, terminal, connection),
            Err(e) => {
                warn!(session = %id, error = %e, "Failed to open event stream");
                Session::failed(id, query, terminal)
            }
        };
        self.session = Some(session);
        self.publish();
        Some(id)
    }

    /// Apply one transport message. Returns whether the snapshot changed.
    pub fn handle(&mut self, message: TransportMessage) -> bool {
        let Some(session) = self.session.as_mut() else {
            debug!(session = %message.session, "Dropping message, no active session");
            return false;
        };
        if message.session != session.id() {
            debug!(
                session = %message.session,
                active = %session.id(),
                "Dropping message from superseded session"
            );
            return false;
        }
        if !session.is_loading() {
            debug!(session = %message.session, "Ignoring message for closed session");
            return false;
        }

        match message.event {
            TransportEvent::Opened => {
                debug!(session = %message.session, "Event stream accepted");
                return false;
            }
            TransportEvent::Named { name, data } => {
                session.dispatch(&self.catalog, &name, &data);
            }
            TransportEvent::Error(reason) => {
                session.on_transport_error(&reason);
            }
            TransportEvent::Ended => {
                session.on_transport_error("stream ended before completion");
            }
        }
        self.publish();
        true
    }

    /// Wait for the next transport message and apply it
    pub async fn next_message(&mut self) -> Option<bool> {
        let message = self.rx.recv().await?;
        Some(self.handle(message))
    }

    /// Drive the current session until it stops loading
    pub async fn run_until_idle(&mut self) {
        while self.is_loading() {
            if self.next_message().await.is_none() {
                break;
            }
        }
        if let Some(session) = &self.session {
            info!(
                session = %session.id(),
                state = ?session.state(),
                entries = session.log().len(),
                "Session idle"
            );
        }
    }

    pub fn is_loading(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_loading())
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session
            .as_ref()
            .map(Session::snapshot)
            .unwrap_or_default()
    }

    /// Progress marks for the current session
    pub fn progress(&self) -> Vec<StageProgress> {
        progress(
            &self.catalog,
            self.session.as_ref().and_then(|s| s.current_stage()),
        )
    }

    /// Receive a snapshot after every change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}
