//! Device directory - static address -> identity tables
//!
//! A device proves who it is only by the address it connects from. The
//! directory maps that address to a car (with the infrared sighting code it
//! broadcasts) or a base station, and teams come from separate id -> team
//! tables. Everything here is immutable once loaded.

use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use serde::Deserialize;

use crate::game::{BaseStationId, CarId, TeamId};

/// Code a car's infrared emitter broadcasts so other devices can recognise it
pub type SightingCode = u8;

/// What a connecting address resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceIdentity {
    Car {
        id: CarId,
        team: TeamId,
        sighting_code: SightingCode,
    },
    BaseStation {
        id: BaseStationId,
        team: TeamId,
    },
}

/// On-disk layout of a directory file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DirectoryFile {
    /// Display names used in logs
    pub teams: HashMap<TeamId, String>,
    /// Car address -> car entry
    pub cars: HashMap<String, CarEntry>,
    /// Base station address -> base station entry
    pub base_stations: HashMap<String, BaseStationEntry>,
    /// Car id -> team
    pub car_teams: HashMap<CarId, TeamId>,
    /// Base station id -> team
    pub base_station_teams: HashMap<BaseStationId, TeamId>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CarEntry {
    pub id: CarId,
    pub sighting_code: SightingCode,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BaseStationEntry {
    pub id: BaseStationId,
}

/// Resolved, validated directory
#[derive(Debug, Clone)]
pub struct DeviceDirectory {
    by_address: HashMap<IpAddr, DeviceIdentity>,
    car_by_code: HashMap<SightingCode, CarId>,
    team_names: BTreeMap<TeamId, String>,
}

impl DeviceDirectory {
    /// Build the directory from its raw tables, validating them
    pub fn from_tables(file: DirectoryFile) -> Result<Self, DirectoryError> {
        let mut by_address = HashMap::new();
        let mut car_by_code = HashMap::new();
        let mut car_ids = HashMap::new();
        let mut station_ids = HashMap::new();

        for (address, entry) in &file.cars {
            let ip = parse_address(address)?;
            let team = *file
                .car_teams
                .get(&entry.id)
                .ok_or(DirectoryError::CarWithoutTeam(entry.id))?;
            if car_ids.insert(entry.id, ip).is_some() {
                return Err(DirectoryError::DuplicateCar(entry.id));
            }
            if car_by_code.insert(entry.sighting_code, entry.id).is_some() {
                return Err(DirectoryError::DuplicateSightingCode(entry.sighting_code));
            }
            let car = DeviceIdentity::Car {
                id: entry.id,
                team,
                sighting_code: entry.sighting_code,
            };
            if by_address.insert(ip, car).is_some() {
                return Err(DirectoryError::AddressReused(ip));
            }
        }

        for (address, entry) in &file.base_stations {
            let ip = parse_address(address)?;
            let team = *file
                .base_station_teams
                .get(&entry.id)
                .ok_or(DirectoryError::BaseStationWithoutTeam(entry.id))?;
            if station_ids.insert(entry.id, ip).is_some() {
                return Err(DirectoryError::DuplicateBaseStation(entry.id));
            }
            if by_address
                .insert(ip, DeviceIdentity::BaseStation { id: entry.id, team })
                .is_some()
            {
                return Err(DirectoryError::AddressReused(ip));
            }
        }

        Ok(Self {
            by_address,
            car_by_code,
            team_names: file.teams.into_iter().collect(),
        })
    }

    /// Load and validate a JSON directory file
    pub fn from_file(path: &Path) -> Result<Self, DirectoryError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse and validate a JSON directory document
    pub fn from_json(raw: &str) -> Result<Self, DirectoryError> {
        let file: DirectoryFile = serde_json::from_str(raw)?;
        Self::from_tables(file)
    }

    /// Identity behind a connecting address, if it is one of ours
    pub fn resolve(&self, ip: IpAddr) -> Option<DeviceIdentity> {
        self.by_address.get(&ip).copied()
    }

    /// Car that broadcasts `code`
    pub fn car_for_code(&self, code: SightingCode) -> Option<CarId> {
        self.car_by_code.get(&code).copied()
    }

    /// Human readable team name for log lines
    pub fn team_name(&self, team: TeamId) -> String {
        self.team_names
            .get(&team)
            .cloned()
            .unwrap_or_else(|| format!("Team {}", team))
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

impl Default for DeviceDirectory {
    /// The reference arena: four cars on two teams plus one base station each
    fn default() -> Self {
        let mut by_address = HashMap::new();
        let mut car_by_code = HashMap::new();

        for id in 1..=4u8 {
            let team = if id <= 2 { 1 } else { 2 };
            by_address.insert(
                IpAddr::V4(Ipv4Addr::new(192, 168, 77, 50 + id)),
                DeviceIdentity::Car {
                    id,
                    team,
                    sighting_code: id,
                },
            );
            car_by_code.insert(id, id);
        }
        for id in 1..=2u8 {
            by_address.insert(
                IpAddr::V4(Ipv4Addr::new(192, 168, 77, 10 + id)),
                DeviceIdentity::BaseStation { id, team: id },
            );
        }

        Self {
            by_address,
            car_by_code,
            team_names: BTreeMap::from([
                (1, "Team Alpha".to_string()),
                (2, "Team Beta".to_string()),
            ]),
        }
    }
}

fn parse_address(raw: &str) -> Result<IpAddr, DirectoryError> {
    raw.trim()
        .parse()
        .map_err(|_| DirectoryError::InvalidAddress(raw.to_string()))
}

/// Directory loading errors
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("failed to read directory file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed directory file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not an IP address: {0}")]
    InvalidAddress(String),

    #[error("address {0} is assigned to more than one device")]
    AddressReused(IpAddr),

    #[error("car {0} is listed more than once")]
    DuplicateCar(CarId),

    #[error("base station {0} is listed more than once")]
    DuplicateBaseStation(BaseStationId),

    #[error("sighting code {0:#04x} is used by more than one car")]
    DuplicateSightingCode(SightingCode),

    #[error("car {0} has no team assignment")]
    CarWithoutTeam(CarId),

    #[error("base station {0} has no team assignment")]
    BaseStationWithoutTeam(BaseStationId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    #[test]
    fn default_directory_resolves_reference_devices() {
        let directory = DeviceDirectory::default();
        assert_eq!(directory.len(), 6);

        assert_eq!(
            directory.resolve(ip("192.168.77.51")),
            Some(DeviceIdentity::Car {
                id: 1,
                team: 1,
                sighting_code: 0x01
            })
        );
        assert_eq!(
            directory.resolve(ip("192.168.77.54")),
            Some(DeviceIdentity::Car {
                id: 4,
                team: 2,
                sighting_code: 0x04
            })
        );
        assert_eq!(
            directory.resolve(ip("192.168.77.12")),
            Some(DeviceIdentity::BaseStation { id: 2, team: 2 })
        );
        assert_eq!(directory.resolve(ip("10.0.0.1")), None);
    }

    #[test]
    fn reverse_lookup_translates_sighting_codes() {
        let directory = DeviceDirectory::default();
        assert_eq!(directory.car_for_code(0x03), Some(3));
        assert_eq!(directory.car_for_code(0x7f), None);
    }

    #[test]
    fn team_names_fall_back_to_number() {
        let directory = DeviceDirectory::default();
        assert_eq!(directory.team_name(1), "Team Alpha");
        assert_eq!(directory.team_name(9), "Team 9");
    }

    #[test]
    fn loads_json_directory() {
        let directory = DeviceDirectory::from_json(
            r#"{
                "teams": { "1": "Red" },
                "cars": { "127.0.0.1": { "id": 7, "sighting_code": 18 } },
                "base_stations": { "127.0.0.2": { "id": 1 } },
                "car_teams": { "7": 1 },
                "base_station_teams": { "1": 1 }
            }"#,
        )
        .unwrap();

        assert_eq!(directory.car_for_code(0x12), Some(7));
        assert_eq!(
            directory.resolve(ip("127.0.0.2")),
            Some(DeviceIdentity::BaseStation { id: 1, team: 1 })
        );
        assert_eq!(directory.team_name(1), "Red");
    }

    #[test]
    fn rejects_duplicate_sighting_codes() {
        let result = DeviceDirectory::from_json(
            r#"{
                "cars": {
                    "127.0.0.1": { "id": 1, "sighting_code": 1 },
                    "127.0.0.2": { "id": 2, "sighting_code": 1 }
                },
                "car_teams": { "1": 1, "2": 2 }
            }"#,
        );
        assert!(matches!(result, Err(DirectoryError::DuplicateSightingCode(1))));
    }

    #[test]
    fn rejects_car_without_team() {
        let result = DeviceDirectory::from_json(
            r#"{ "cars": { "127.0.0.1": { "id": 5, "sighting_code": 5 } } }"#,
        );
        assert!(matches!(result, Err(DirectoryError::CarWithoutTeam(5))));
    }

    #[test]
    fn rejects_address_shared_by_car_and_station() {
        let result = DeviceDirectory::from_json(
            r#"{
                "cars": { "127.0.0.1": { "id": 1, "sighting_code": 1 } },
                "base_stations": { "127.0.0.1": { "id": 1 } },
                "car_teams": { "1": 1 },
                "base_station_teams": { "1": 1 }
            }"#,
        );
        assert!(matches!(result, Err(DirectoryError::AddressReused(_))));
    }

    #[test]
    fn rejects_two_cars_on_one_address() {
        let result = DeviceDirectory::from_json(
            r#"{
                "cars": {
                    "127.0.0.1": { "id": 1, "sighting_code": 1 },
                    " 127.0.0.1": { "id": 2, "sighting_code": 2 }
                },
                "car_teams": { "1": 1, "2": 2 }
            }"#,
        );
        assert!(matches!(
            result,
            Err(DirectoryError::AddressReused(ip)) if ip == IpAddr::from([127, 0, 0, 1])
        ));
    }

    #[test]
    fn rejects_non_ip_address() {
        let result = DeviceDirectory::from_json(
            r#"{
                "cars": { "car-one.local": { "id": 1, "sighting_code": 1 } },
                "car_teams": { "1": 1 }
            }"#,
        );
        assert!(matches!(result, Err(DirectoryError::InvalidAddress(_))));
    }
}
