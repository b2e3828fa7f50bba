//! Device entities held by the registry

use std::net::IpAddr;
use std::time::Instant;

use super::{BaseStationId, CarId, DeviceKind, SessionId, TeamId};

/// A connected car (authoritative state, mutated only by the game loop)
#[derive(Debug, Clone)]
pub struct Car {
    pub id: CarId,
    pub team: TeamId,
    pub address: IpAddr,
    pub session: SessionId,
    pub last_seen: Instant,

    // Tag penalty: `disabled_until` is `Some` exactly while the car is disabled
    pub disabled_until: Option<Instant>,

    // Safe zone / flag
    pub has_flag: bool,
    pub is_safe: bool,
    pub last_safe_at: Option<Instant>,

    // Control panel motion watchdog
    pub is_moving: bool,
    pub last_command_at: Option<Instant>,
}

impl Car {
    pub fn new(id: CarId, team: TeamId, address: IpAddr, session: SessionId, now: Instant) -> Self {
        Self {
            id,
            team,
            address,
            session,
            last_seen: now,
            disabled_until: None,
            has_flag: false,
            is_safe: false,
            last_safe_at: None,
            is_moving: false,
            last_command_at: None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled_until.is_some()
    }
}

/// A connected base station; its team never changes
#[derive(Debug, Clone)]
pub struct BaseStation {
    pub id: BaseStationId,
    pub team: TeamId,
    pub address: IpAddr,
    pub session: SessionId,
    pub last_seen: Instant,
}

impl BaseStation {
    pub fn new(
        id: BaseStationId,
        team: TeamId,
        address: IpAddr,
        session: SessionId,
        now: Instant,
    ) -> Self {
        Self {
            id,
            team,
            address,
            session,
            last_seen: now,
        }
    }
}

/// Either kind of device, as carried by `Event::DeviceConnected`
#[derive(Debug, Clone)]
pub enum Device {
    Car(Car),
    BaseStation(BaseStation),
}

impl Device {
    pub fn kind(&self) -> DeviceKind {
        match self {
            Device::Car(_) => DeviceKind::Car,
            Device::BaseStation(_) => DeviceKind::BaseStation,
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Device::Car(car) => car.id,
            Device::BaseStation(station) => station.id,
        }
    }

    pub fn team(&self) -> TeamId {
        match self {
            Device::Car(car) => car.team,
            Device::BaseStation(station) => station.team,
        }
    }

    pub fn address(&self) -> IpAddr {
        match self {
            Device::Car(car) => car.address,
            Device::BaseStation(station) => station.address,
        }
    }

    pub fn session(&self) -> SessionId {
        match self {
            Device::Car(car) => car.session,
            Device::BaseStation(station) => station.session,
        }
    }
}
