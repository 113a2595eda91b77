//! Stagewatch core library
//!
//! Consumes the staged event stream of the analysis pipeline backend:
//! - `stages`: stage catalog and progress cursor
//! - `transport`: SSE decoding and the HTTP event-stream transport
//! - `session`: one in-flight query and its result log
//! - `client`: single-session controller publishing snapshots
//! - `config`: file and environment configuration

pub mod client;
pub mod config;
pub mod session;
pub mod stages;
pub mod transport;

pub use client::QueryClient;
pub use config::{Config, ConfigError};
pub use session::{ResultLog, Session, SessionId, SessionSnapshot, SessionState, StageEvent};
pub use stages::{progress, ProgressMark, StageCatalog, StageName, StageProgress};
pub use transport::{HttpSseTransport, Transport, TransportError};
