//! Game state, rules and the authoritative loop

pub mod control;
pub mod device;
pub mod game_loop;
pub mod registry;
pub mod rules;
pub mod snapshot;

pub use control::{CarAction, ControlError, ControlHandle, ControlRequest};
pub use device::{BaseStation, Car, Device};
pub use game_loop::GameLoop;
pub use registry::GameState;
pub use snapshot::GameSnapshot;

use std::net::IpAddr;

pub type CarId = u8;
pub type BaseStationId = u8;
pub type TeamId = u8;

/// Identifies one accepted connection; increases for every new session
pub type SessionId = u64;

/// Canonical input of the game loop, produced by the ingestion side
#[derive(Debug, Clone)]
pub enum Event {
    /// A device resolved its identity and is ready for commands
    DeviceConnected(Device),
    /// The device's connection closed or faulted
    DeviceDisconnected {
        kind: DeviceKind,
        id: u8,
        address: IpAddr,
        session: SessionId,
    },
    /// A car's receiver picked up another car's emitter
    CarSighted { shooter: CarId, target: CarId },
    /// A base station's receiver picked up a car's emitter
    BaseStationSighted {
        base_station: BaseStationId,
        car: CarId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Car,
    BaseStation,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Car => write!(f, "car"),
            DeviceKind::BaseStation => write!(f, "base station"),
        }
    }
}
