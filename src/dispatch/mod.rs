//! Outbound device commands and the connections they travel over

pub mod commands;
pub mod connections;

pub use commands::{encode, DeviceCommand, Motion};
pub use connections::{Connection, ConnectionDirectory, DispatchError, OUTBOUND_QUEUE_DEPTH};
