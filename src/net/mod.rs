//! Device-facing TCP side: accept worker, ingestion sessions, line protocol

pub mod listener;
pub mod protocol;
pub mod session;

pub use listener::run_device_listener;
pub use protocol::ProtocolError;
pub use session::{handle_connection, IngestContext};
