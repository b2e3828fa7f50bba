//! Live device connections and the command dispatcher
//!
//! Connection workers are the only writers: they register on identity
//! resolution and unregister when their stream ends. The game loop and the
//! operator panel only read, to route outbound commands.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::game::{DeviceKind, SessionId};

use super::commands::DeviceCommand;

/// Outbound frames a connection may have queued before new ones are dropped
pub const OUTBOUND_QUEUE_DEPTH: usize = 32;

/// Handle to one live device connection
#[derive(Debug, Clone)]
pub struct Connection {
    pub kind: DeviceKind,
    pub device_id: u8,
    pub session: SessionId,
    /// Frames for the connection's writer task
    outbound: mpsc::Sender<Bytes>,
}

impl Connection {
    pub fn new(
        kind: DeviceKind,
        device_id: u8,
        session: SessionId,
        outbound: mpsc::Sender<Bytes>,
    ) -> Self {
        Self {
            kind,
            device_id,
            session,
            outbound,
        }
    }
}

/// Registry of live connections keyed by peer address
pub struct ConnectionDirectory {
    connections: DashMap<IpAddr, Connection>,
    next_session: AtomicU64,
}

impl ConnectionDirectory {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_session: AtomicU64::new(1),
        }
    }

    /// Allocate the id for a newly accepted session
    pub fn next_session(&self) -> SessionId {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a connection, replacing any older session from the same address
    pub fn register(&self, address: IpAddr, connection: Connection) -> Option<Connection> {
        let session = connection.session;
        let replaced = self.connections.insert(address, connection);
        if let Some(old) = &replaced {
            info!(
                addr = %address,
                old_session = old.session,
                new_session = session,
                "Connection replaced by reconnect"
            );
        }
        replaced
    }

    /// Remove the entry for `address` if it still belongs to `session`
    pub fn unregister(&self, address: IpAddr, session: SessionId) -> bool {
        self.connections
            .remove_if(&address, |_, conn| conn.session == session)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Queue a command for the device at `address`
    ///
    /// Never blocks and never retries: a missing connection or a full
    /// queue drops the command and reports why.
    pub fn dispatch(&self, address: IpAddr, command: DeviceCommand) -> Result<(), DispatchError> {
        let outbound = self
            .connections
            .get(&address)
            .map(|conn| conn.outbound.clone())
            .ok_or(DispatchError::NotConnected(address))?;

        outbound
            .try_send(command.encode())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DispatchError::Backlogged(address),
                mpsc::error::TrySendError::Closed(_) => DispatchError::Closed(address),
            })?;

        debug!(addr = %address, command = %command, "Command queued");
        Ok(())
    }
}

impl Default for ConnectionDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a command did not reach a device
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("no live connection for {0}")]
    NotConnected(IpAddr),

    #[error("outbound queue for {0} is full")]
    Backlogged(IpAddr),

    #[error("connection to {0} is closing")]
    Closed(IpAddr),
}
