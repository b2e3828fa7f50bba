//! Read-only views of the registry for the operator panel

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Instant;

use serde::Serialize;

use crate::util::time::{millis_since, millis_until, unix_millis};

use super::registry::GameState;
use super::{BaseStationId, CarId, TeamId};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CarSnapshot {
    pub id: CarId,
    pub team: TeamId,
    pub address: IpAddr,
    pub disabled: bool,
    pub disabled_remaining_ms: u64,
    pub has_flag: bool,
    pub safe: bool,
    pub moving: bool,
    /// Time since the car last reported a sighting (or connected)
    pub last_seen_ms_ago: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BaseStationSnapshot {
    pub id: BaseStationId,
    pub team: TeamId,
    pub address: IpAddr,
    pub last_seen_ms_ago: u64,
}

/// State published by the game loop whenever something changed
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct GameSnapshot {
    /// Loop iteration that produced this snapshot
    pub tick: u64,
    pub server_time: u64,
    pub cars: Vec<CarSnapshot>,
    pub base_stations: Vec<BaseStationSnapshot>,
    /// Team -> car holding the team's flag
    pub flags: BTreeMap<TeamId, CarId>,
}

impl GameSnapshot {
    pub fn build(tick: u64, state: &GameState, now: Instant) -> Self {
        let cars = state
            .cars()
            .map(|car| CarSnapshot {
                id: car.id,
                team: car.team,
                address: car.address,
                disabled: car.is_disabled(),
                disabled_remaining_ms: car
                    .disabled_until
                    .map(|until| millis_until(until, now))
                    .unwrap_or(0),
                has_flag: car.has_flag,
                safe: car.is_safe,
                moving: car.is_moving,
                last_seen_ms_ago: millis_since(car.last_seen, now),
            })
            .collect();

        let base_stations = state
            .base_stations()
            .map(|station| BaseStationSnapshot {
                id: station.id,
                team: station.team,
                address: station.address,
                last_seen_ms_ago: millis_since(station.last_seen, now),
            })
            .collect();

        Self {
            tick,
            server_time: unix_millis(),
            cars,
            base_stations,
            flags: state.flags().collect(),
        }
    }

    pub fn car(&self, id: CarId) -> Option<&CarSnapshot> {
        self.cars.iter().find(|car| car.id == id)
    }
}
