//! Stream session
//!
//! One session per submitted query. The session owns the transport
//! connection, decodes incoming events into the result log, tracks the most
//! recent stage, and releases the connection exactly once on every exit path.

mod result_log;

pub use result_log::{ResultLog, StageEvent};

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::stages::{StageCatalog, StageHandling, StageName};
use crate::transport::Connection;

/// Identifies one session within a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Coarse lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Stream is open and events are being applied
    Open,
    /// Terminal stage received
    ClosedDone,
    /// Transport failed or ended early
    ClosedError,
    /// Replaced by a newer query
    ClosedSuperseded,
}

impl SessionState {
    pub fn is_open(&self) -> bool {
        matches!(self, SessionState::Open)
    }
}

/// Read-only view of a session for rendering
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session: Option<SessionId>,
    pub query: String,
    pub log: ResultLog,
    pub current_stage: Option<StageName>,
    pub done: bool,
    pub loading: bool,
    /// Events dropped because their payload did not decode
    pub rejected: usize,
    pub state: Option<SessionState>,
}

/// One in-flight query
pub struct Session {
    id: SessionId,
    query: String,
    terminal: StageName,
    connection: Option<Box<dyn Connection>>,
    log: ResultLog,
    current_stage: Option<StageName>,
    done: bool,
    rejected: usize,
    state: SessionState,
}

impl Session {
    /// Open a session over an established connection
    pub fn open(
        id: SessionId,
        query: impl Into<String>,
        terminal: StageName,
        connection: Box<dyn Connection>,
    ) -> Self {
        let query = query.into();
        info!(session = %id, query = %query, "Session opened");
        Self {
            id,
            query,
            terminal,
            connection: Some(connection),
            log: ResultLog::new(),
            current_stage: None,
            done: false,
            rejected: 0,
            state: SessionState::Open,
        }
    }

    /// Session whose connection could not be opened
    pub fn failed(id: SessionId, query: impl Into<String>, terminal: StageName) -> Self {
        Self {
            id,
            query: query.into(),
            terminal,
            connection: None,
            log: ResultLog::new(),
            current_stage: None,
            done: false,
            rejected: 0,
            state: SessionState::ClosedError,
        }
    }

    /// Route a named event through the catalog's handling table
    pub fn dispatch(&mut self, catalog: &StageCatalog, name: &str, raw: &str) {
        match catalog.handling(name) {
            StageHandling::Terminal => self.on_done(raw),
            StageHandling::Append => {
                if !catalog.contains(name) {
                    debug!(session = %self.id, stage = name, "Event outside stage catalog");
                }
                self.on_event(name, raw);
            }
        }
    }

    /// Apply a non-terminal event. Returns whether it was appended.
    pub fn on_event(&mut self, stage: impl Into<StageName>, raw: &str) -> bool {
        let stage = stage.into();
        if !self.state.is_open() {
            debug!(session = %self.id, stage = %stage, "Ignoring event after session closed");
            return false;
        }
        let Some(payload) = self.decode(&stage, raw) else {
            return false;
        };
        debug!(session = %self.id, stage = %stage, entries = self.log.len() + 1, "Stage event");
        self.log.push(StageEvent::new(stage.clone(), payload));
        self.current_stage = Some(stage);
        true
    }

    /// Apply the terminal event and close the session as completed
    pub fn on_done(&mut self, raw: &str) {
        if !self.state.is_open() {
            debug!(session = %self.id, "Ignoring terminal event after session closed");
            return;
        }
        let stage = self.terminal.clone();
        if let Some(payload) = self.decode(&stage, raw) {
            self.log.push(StageEvent::new(stage.clone(), payload));
        }
        self.current_stage = Some(stage);
        self.done = true;
        info!(session = %self.id, entries = self.log.len(), "Session completed");
        self.finish(SessionState::ClosedDone);
    }

    /// Stop on a transport failure, keeping whatever already arrived
    pub fn on_transport_error(&mut self, reason: &str) {
        if !self.state.is_open() {
            return;
        }
        warn!(
            session = %self.id,
            entries = self.log.len(),
            reason = reason,
            "Session stopped by transport"
        );
        self.finish(SessionState::ClosedError);
    }

    /// Close the session if it is still open and release its connection.
    ///
    /// Safe to call any number of times.
    pub fn close(&mut self) {
        if self.state.is_open() {
            info!(session = %self.id, "Session superseded");
            self.state = SessionState::ClosedSuperseded;
        }
        self.release();
    }

    fn finish(&mut self, state: SessionState) {
        self.state = state;
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
    }

    fn decode(&mut self, stage: &StageName, raw: &str) -> Option<Value> {
        match serde_json::from_str::<Value>(raw) {
            Ok(payload) => Some(payload),
            Err(e) => {
                self.rejected += 1;
                warn!(
                    session = %self.id,
                    stage = %stage,
                    error = %e,
                    "Dropping event with malformed payload"
                );
                None
            }
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn log(&self) -> &ResultLog {
        &self.log
    }

    pub fn current_stage(&self) -> Option<&StageName> {
        self.current_stage.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Stream still open
    pub fn is_loading(&self) -> bool {
        self.state.is_open()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Whether the connection has been given up
    pub fn is_released(&self) -> bool {
        self.connection.is_none()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: Some(self.id),
            query: self.query.clone(),
            log: self.log.clone(),
            current_stage: self.current_stage.clone(),
            done: self.done,
            loading: self.is_loading(),
            rejected: self.rejected,
            state: Some(self.state),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("state", &self.state)
            .field("entries", &self.log.len())
            .field("current_stage", &self.current_stage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::RecordingConnection;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn open_session() -> (Session, Arc<AtomicUsize>) {
        let (connection, closes) = RecordingConnection::new();
        let session = Session::open(
            SessionId::new(1),
            "compare rainfall with crop yield",
            StageName::from("done"),
            Box::new(connection),
        );
        (session, closes)
    }

    fn stages(session: &Session) -> Vec<String> {
        session.log().iter().map(|e| e.stage.to_string()).collect()
    }

    #[test]
    fn test_append_in_arrival_order() {
        let (mut session, _) = open_session();
        let catalog = StageCatalog::pipeline();
        for stage in ["head2", "status", "registry", "family"] {
            session.dispatch(&catalog, stage, r#"{"ok": true}"#);
        }
        assert_eq!(stages(&session), ["head2", "status", "registry", "family"]);
        assert_eq!(session.current_stage(), Some(&StageName::from("family")));
        assert!(session.is_loading());
        assert!(!session.is_done());
    }

    #[test]
    fn test_done_closes_once() {
        let (mut session, closes) = open_session();
        let catalog = StageCatalog::pipeline();
        session.dispatch(&catalog, "status", r#"{"msg": "started"}"#);
        session.dispatch(&catalog, "done", r#"{"answer": 42}"#);

        assert_eq!(session.state(), SessionState::ClosedDone);
        assert!(session.is_done());
        assert!(!session.is_loading());
        assert_eq!(session.current_stage(), Some(&StageName::from("done")));
        assert_eq!(session.log().last().unwrap().payload, json!({"answer": 42}));
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        // Spurious events and a duplicate done after completion
        session.dispatch(&catalog, "head1", "{}");
        session.dispatch(&catalog, "done", "{}");
        session.on_transport_error("late error");
        session.close();
        drop(session);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transport_error_keeps_partial_results() {
        let (mut session, closes) = open_session();
        assert!(session.on_event("status", "{}"));
        assert!(session.on_event("family", r#"{"selected_datasets": [-1]}"#));
        session.on_transport_error("connection reset");

        assert_eq!(session.state(), SessionState::ClosedError);
        assert_eq!(session.log().len(), 2);
        assert_eq!(session.current_stage(), Some(&StageName::from("family")));
        assert!(!session.is_done());
        assert!(!session.is_loading());
        assert!(session.is_released());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_malformed_payload_is_isolated() {
        let (mut session, closes) = open_session();
        assert!(session.on_event("status", "{}"));
        assert!(!session.on_event("family", "{not json"));
        assert!(session.on_event("datasets", "[1, 2]"));

        assert_eq!(stages(&session), ["status", "datasets"]);
        assert_eq!(session.current_stage(), Some(&StageName::from("datasets")));
        assert_eq!(session.rejected(), 1);
        assert!(session.is_loading());
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_malformed_done_still_terminates() {
        let (mut session, closes) = open_session();
        session.on_event("status", "{}");
        session.on_done("<html>");

        assert!(session.is_done());
        assert_eq!(session.current_stage(), Some(&StageName::from("done")));
        assert_eq!(stages(&session), ["status"]);
        assert_eq!(session.rejected(), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_stage_is_appended() {
        let (mut session, _) = open_session();
        let catalog = StageCatalog::pipeline();
        session.dispatch(&catalog, "head4", r#""extra""#);
        assert_eq!(stages(&session), ["head4"]);
        assert_eq!(session.current_stage(), Some(&StageName::from("head4")));
        assert!(session.is_loading());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut session, closes) = open_session();
        session.on_event("status", "{}");
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::ClosedSuperseded);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(!session.on_event("family", "{}"));
        assert_eq!(session.log().len(), 1);
    }

    #[test]
    fn test_drop_releases_open_connection() {
        let (session, closes) = open_session();
        drop(session);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_snapshot() {
        let (mut session, _) = open_session();
        session.on_event("status", r#"{"msg": "started"}"#);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.session, Some(SessionId::new(1)));
        assert_eq!(snapshot.query, "compare rainfall with crop yield");
        assert_eq!(snapshot.log.len(), 1);
        assert!(snapshot.loading);
        assert!(!snapshot.done);
        assert_eq!(snapshot.state, Some(SessionState::Open));
    }
}
