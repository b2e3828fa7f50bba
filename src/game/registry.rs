//! Device registry - authoritative game state
//!
//! Owned by the game loop task and by nothing else, so no field here is
//! behind a lock. Every mutation of cars, base stations or flags goes
//! through one of the methods below.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::time::Instant;

use tracing::debug;

use crate::config::GameConfig;
use crate::dispatch::Motion;

use super::control::{CarAction, ControlError};
use super::device::{BaseStation, Car, Device};
use super::rules::{HitRejection, TagRules};
use super::{BaseStationId, CarId, DeviceKind, SessionId, TeamId};

/// A valid hit that disabled its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub shooter: CarId,
    pub target: CarId,
    pub target_address: IpAddr,
    pub until: Instant,
}

/// A car entered or left its safe zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyChange {
    pub car: CarId,
    pub team: TeamId,
    pub safe: bool,
    /// The car carried its team's flag out of the safe zone
    pub flag_captured: bool,
}

/// Transitions produced by the timer sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTransition {
    /// Penalty over; the car must be told it may drive again
    ReEnabled { car: CarId, address: IpAddr },
    /// No corroborating sighting in time
    SafeZoneExpired(SafetyChange),
    /// Operator stopped sending commands while the car was moving
    MotionTimedOut { car: CarId, address: IpAddr },
}

/// Connected devices plus per-team flag slots
#[derive(Debug, Default)]
pub struct GameState {
    cars: BTreeMap<CarId, Car>,
    base_stations: BTreeMap<BaseStationId, BaseStation>,
    /// Team -> car holding that team's flag; absent when nobody holds it
    flags: HashMap<TeamId, CarId>,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn car(&self, id: CarId) -> Option<&Car> {
        self.cars.get(&id)
    }

    pub fn base_station(&self, id: BaseStationId) -> Option<&BaseStation> {
        self.base_stations.get(&id)
    }

    pub fn cars(&self) -> impl Iterator<Item = &Car> {
        self.cars.values()
    }

    pub fn base_stations(&self) -> impl Iterator<Item = &BaseStation> {
        self.base_stations.values()
    }

    pub fn flag_holder(&self, team: TeamId) -> Option<CarId> {
        self.flags.get(&team).copied()
    }

    pub fn flags(&self) -> impl Iterator<Item = (TeamId, CarId)> + '_ {
        self.flags.iter().map(|(team, car)| (*team, *car))
    }

    /// Insert a device; a known id is replaced by the new session
    ///
    /// Returns true when an older entry was replaced.
    pub fn insert_device(&mut self, device: Device) -> bool {
        match device {
            Device::Car(car) => {
                let id = car.id;
                let replaced = self.cars.insert(id, car);
                if let Some(old) = &replaced {
                    self.release_flag_of(old.id, old.team);
                }
                replaced.is_some()
            }
            Device::BaseStation(station) => {
                self.base_stations.insert(station.id, station).is_some()
            }
        }
    }

    /// Remove a device if the entry still belongs to `session`
    pub fn remove_device(&mut self, kind: DeviceKind, id: u8, session: SessionId) -> bool {
        match kind {
            DeviceKind::Car => {
                if self.cars.get(&id).map(|c| c.session) != Some(session) {
                    return false;
                }
                if let Some(car) = self.cars.remove(&id) {
                    self.release_flag_of(car.id, car.team);
                }
                true
            }
            DeviceKind::BaseStation => {
                if self.base_stations.get(&id).map(|s| s.session) != Some(session) {
                    return false;
                }
                self.base_stations.remove(&id).is_some()
            }
        }
    }

    /// Record inbound activity from a device
    pub fn touch(&mut self, kind: DeviceKind, id: u8, now: Instant) {
        match kind {
            DeviceKind::Car => {
                if let Some(car) = self.cars.get_mut(&id) {
                    car.last_seen = now;
                }
            }
            DeviceKind::BaseStation => {
                if let Some(station) = self.base_stations.get_mut(&id) {
                    station.last_seen = now;
                }
            }
        }
    }

    /// `shooter`'s receiver saw `target`; disable the target if the hit counts
    pub fn apply_hit(
        &mut self,
        shooter: CarId,
        target: CarId,
        now: Instant,
        game: &GameConfig,
    ) -> Result<Tag, HitRejection> {
        TagRules::judge_hit(self.cars.get(&shooter), self.cars.get(&target))?;

        let until = TagRules::penalty_deadline(now, game.penalty_duration);
        let car = self
            .cars
            .get_mut(&target)
            .ok_or(HitRejection::UnknownTarget)?;
        car.disabled_until = Some(until);

        Ok(Tag {
            shooter,
            target,
            target_address: car.address,
            until,
        })
    }

    /// `station` saw `car`; refresh or revoke the car's safety
    ///
    /// Returns the resulting transition, or `None` when either device is
    /// unknown or the car's safety did not change.
    pub fn apply_station_sighting(
        &mut self,
        station: BaseStationId,
        car: CarId,
        now: Instant,
    ) -> Option<SafetyChange> {
        let station = self.base_stations.get(&station)?;
        let target = self.cars.get_mut(&car)?;

        let safe_now = TagRules::is_safe_sighting(station, target);
        if safe_now {
            target.last_safe_at = Some(now);
        }
        self.set_car_safety(car, safe_now)
    }

    /// Flip a car's safety if it differs; leaving with the flag captures it
    pub fn set_car_safety(&mut self, id: CarId, safe: bool) -> Option<SafetyChange> {
        let car = self.cars.get_mut(&id)?;
        if car.is_safe == safe {
            return None;
        }
        car.is_safe = safe;

        let flag_captured = !safe && car.has_flag && !car.is_disabled();
        let team = car.team;
        if flag_captured {
            car.has_flag = false;
            self.flags.remove(&team);
        }

        Some(SafetyChange {
            car: id,
            team,
            safe,
            flag_captured,
        })
    }

    /// Evaluate every time driven rule once
    pub fn sweep(&mut self, now: Instant, game: &GameConfig) -> Vec<TimerTransition> {
        let mut transitions = Vec::new();
        let ids: Vec<CarId> = self.cars.keys().copied().collect();

        for id in ids {
            let Some(car) = self.cars.get_mut(&id) else {
                continue;
            };

            if TagRules::penalty_expired(car, now) {
                car.disabled_until = None;
                transitions.push(TimerTransition::ReEnabled {
                    car: id,
                    address: car.address,
                });
            }

            if let Some(timeout) = game.command_timeout {
                if TagRules::motion_expired(car, now, timeout) {
                    car.is_moving = false;
                    transitions.push(TimerTransition::MotionTimedOut {
                        car: id,
                        address: car.address,
                    });
                }
            }

            if TagRules::safe_zone_expired(car, now, game.safe_zone_timeout) {
                if let Some(change) = self.set_car_safety(id, false) {
                    transitions.push(TimerTransition::SafeZoneExpired(change));
                }
            }
        }

        transitions
    }

    /// Validate an operator action and update the motion watchdog
    ///
    /// Returns the address the command has to go to.
    pub fn apply_control(
        &mut self,
        id: CarId,
        action: CarAction,
        now: Instant,
    ) -> Result<IpAddr, ControlError> {
        let car = self.cars.get_mut(&id).ok_or(ControlError::UnknownCar(id))?;
        if car.is_disabled() {
            return Err(ControlError::CarDisabled(id));
        }

        car.last_command_at = Some(now);
        if let CarAction::Move(motion) = action {
            car.is_moving = motion != Motion::Stop;
        }
        Ok(car.address)
    }

    /// Give a car its team's flag
    ///
    /// Returns false when the car already held it.
    pub fn assign_flag(&mut self, id: CarId) -> Result<bool, ControlError> {
        let car = self.cars.get(&id).ok_or(ControlError::UnknownCar(id))?;
        if car.is_disabled() {
            return Err(ControlError::CarDisabled(id));
        }
        let team = car.team;
        match self.flags.get(&team) {
            Some(holder) if *holder == id => return Ok(false),
            Some(holder) => {
                return Err(ControlError::FlagHeld {
                    team,
                    holder: *holder,
                })
            }
            None => {}
        }

        self.flags.insert(team, id);
        if let Some(car) = self.cars.get_mut(&id) {
            car.has_flag = true;
        }
        Ok(true)
    }

    fn release_flag_of(&mut self, id: CarId, team: TeamId) {
        if self.flags.get(&team) == Some(&id) {
            self.flags.remove(&team);
            debug!(car_id = id, team, "Flag slot released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const PENALTY: Duration = Duration::from_secs(10);
    const SAFE_TIMEOUT: Duration = Duration::from_secs(1);

    fn game() -> GameConfig {
        GameConfig {
            penalty_duration: PENALTY,
            safe_zone_timeout: SAFE_TIMEOUT,
            command_timeout: Some(Duration::from_millis(500)),
            tick_interval: Duration::from_millis(50),
        }
    }

    fn car(id: CarId, team: TeamId, now: Instant) -> Device {
        Device::Car(Car::new(
            id,
            team,
            IpAddr::from([192, 168, 77, 50 + id]),
            id as SessionId,
            now,
        ))
    }

    fn station(id: BaseStationId, team: TeamId, now: Instant) -> Device {
        Device::BaseStation(BaseStation::new(
            id,
            team,
            IpAddr::from([192, 168, 77, 10 + id]),
            100 + id as SessionId,
            now,
        ))
    }

    /// Cars 1,2 on team 1, cars 3,4 on team 2, stations 1/2 for teams 1/2
    fn arena(now: Instant) -> GameState {
        let mut state = GameState::new();
        for (id, team) in [(1, 1), (2, 1), (3, 2), (4, 2)] {
            state.insert_device(car(id, team, now));
        }
        state.insert_device(station(1, 1, now));
        state.insert_device(station(2, 2, now));
        state
    }

    #[test]
    fn teammates_never_disable_each_other() {
        let now = Instant::now();
        let mut state = arena(now);
        for (shooter, target) in [(1, 2), (2, 1), (3, 4), (4, 3)] {
            assert_eq!(
                state.apply_hit(shooter, target, now, &game()),
                Err(HitRejection::FriendlyFire)
            );
        }
        assert!(state.cars().all(|c| !c.is_disabled()));
    }

    #[test]
    fn hit_disables_then_disabled_shooter_is_ignored() {
        let now = Instant::now();
        let mut state = arena(now);

        let tag = state.apply_hit(1, 3, now, &game()).unwrap();
        assert_eq!(tag.target, 3);
        assert_eq!(tag.until, now + PENALTY);
        assert_eq!(state.car(3).unwrap().disabled_until, Some(now + PENALTY));

        assert_eq!(
            state.apply_hit(3, 1, now, &game()),
            Err(HitRejection::ShooterDisabled)
        );
        assert!(!state.car(1).unwrap().is_disabled());
    }

    #[test]
    fn penalty_lifts_exactly_once_after_duration() {
        let now = Instant::now();
        let mut state = arena(now);
        state.apply_hit(1, 3, now, &game()).unwrap();

        let early = state.sweep(now + PENALTY - Duration::from_millis(1), &game());
        assert!(early.is_empty());
        assert!(state.car(3).unwrap().is_disabled());

        let lifted = state.sweep(now + PENALTY, &game());
        assert_eq!(
            lifted,
            vec![TimerTransition::ReEnabled {
                car: 3,
                address: IpAddr::from([192, 168, 77, 53])
            }]
        );
        assert!(!state.car(3).unwrap().is_disabled());

        assert!(state.sweep(now + PENALTY * 2, &game()).is_empty());
    }

    #[test]
    fn safe_target_cannot_be_hit() {
        let now = Instant::now();
        let mut state = arena(now);
        state.apply_station_sighting(2, 3, now).unwrap();

        assert_eq!(
            state.apply_hit(1, 3, now, &game()),
            Err(HitRejection::TargetSafe)
        );
    }

    #[test]
    fn own_station_makes_safe_and_enemy_station_revokes() {
        let now = Instant::now();
        let mut state = arena(now);
        state.assign_flag(1).unwrap();

        let entered = state.apply_station_sighting(1, 1, now).unwrap();
        assert!(entered.safe);
        assert!(!entered.flag_captured);
        assert!(state.car(1).unwrap().is_safe);

        // Repeated corroboration refreshes the timestamp without a transition
        let later = now + Duration::from_millis(500);
        assert_eq!(state.apply_station_sighting(1, 1, later), None);
        assert_eq!(state.car(1).unwrap().last_safe_at, Some(later));

        let left = state.apply_station_sighting(2, 1, later).unwrap();
        assert!(!left.safe);
        assert!(left.flag_captured);
        assert_eq!(state.flag_holder(1), None);
        assert!(!state.car(1).unwrap().has_flag);
    }

    #[test]
    fn leaving_without_flag_has_no_flag_side_effect() {
        let now = Instant::now();
        let mut state = arena(now);
        state.assign_flag(2).unwrap();

        state.apply_station_sighting(1, 1, now).unwrap();
        let left = state.apply_station_sighting(2, 1, now).unwrap();
        assert!(!left.flag_captured);
        assert_eq!(state.flag_holder(1), Some(2));
        assert!(state.car(2).unwrap().has_flag);
    }

    #[test]
    fn safe_zone_decays_without_corroboration() {
        let now = Instant::now();
        let mut state = arena(now);
        state.assign_flag(1).unwrap();
        state.apply_station_sighting(1, 1, now).unwrap();

        assert!(state.sweep(now + SAFE_TIMEOUT, &game()).is_empty());
        assert!(state.car(1).unwrap().is_safe);

        let expired = state.sweep(now + SAFE_TIMEOUT + Duration::from_millis(1), &game());
        assert_eq!(
            expired,
            vec![TimerTransition::SafeZoneExpired(SafetyChange {
                car: 1,
                team: 1,
                safe: false,
                flag_captured: true,
            })]
        );
        assert!(!state.car(1).unwrap().is_safe);
        assert_eq!(state.flag_holder(1), None);
    }

    #[test]
    fn disabled_flag_holder_keeps_flag_when_leaving() {
        let now = Instant::now();
        let mut state = arena(now);
        state.assign_flag(3).unwrap();
        state.apply_hit(1, 3, now, &game()).unwrap();

        state.apply_station_sighting(2, 3, now).unwrap();
        let left = state.apply_station_sighting(1, 3, now).unwrap();
        assert!(!left.flag_captured);
        assert_eq!(state.flag_holder(2), Some(3));
    }

    #[test]
    fn disconnected_devices_are_gone_for_good() {
        let now = Instant::now();
        let mut state = arena(now);
        let session = state.car(3).unwrap().session;

        assert!(state.remove_device(DeviceKind::Car, 3, session));
        assert!(state.car(3).is_none());

        assert_eq!(
            state.apply_hit(1, 3, now, &game()),
            Err(HitRejection::UnknownTarget)
        );
        assert_eq!(state.apply_station_sighting(2, 3, now), None);
        assert!(state.car(3).is_none());

        assert!(!state.remove_device(DeviceKind::Car, 3, session));
        assert!(!state.remove_device(DeviceKind::BaseStation, 42, 1));
    }

    #[test]
    fn disconnect_from_stale_session_is_ignored() {
        let now = Instant::now();
        let mut state = arena(now);
        let reconnected = Car::new(1, 1, IpAddr::from([192, 168, 77, 51]), 999, now);
        assert!(state.insert_device(Device::Car(reconnected)));

        assert!(!state.remove_device(DeviceKind::Car, 1, 1));
        assert_eq!(state.car(1).unwrap().session, 999);
    }

    #[test]
    fn base_station_disconnect_removes_station() {
        let now = Instant::now();
        let mut state = arena(now);
        let session = state.base_station(2).unwrap().session;
        assert!(state.remove_device(DeviceKind::BaseStation, 2, session));
        assert!(state.base_station(2).is_none());
        assert_eq!(state.apply_station_sighting(2, 3, now), None);
    }

    #[test]
    fn removing_flag_holder_frees_slot() {
        let now = Instant::now();
        let mut state = arena(now);
        state.assign_flag(4).unwrap();
        let session = state.car(4).unwrap().session;

        state.remove_device(DeviceKind::Car, 4, session);
        assert_eq!(state.flag_holder(2), None);
        assert!(state.assign_flag(3).unwrap());
    }

    #[test]
    fn flag_assignment_rules() {
        let now = Instant::now();
        let mut state = arena(now);

        assert_eq!(state.assign_flag(1), Ok(true));
        assert_eq!(state.assign_flag(1), Ok(false));
        assert_eq!(
            state.assign_flag(2),
            Err(ControlError::FlagHeld { team: 1, holder: 1 })
        );
        assert_eq!(state.assign_flag(9), Err(ControlError::UnknownCar(9)));

        state.apply_hit(1, 3, now, &game()).unwrap();
        assert_eq!(state.assign_flag(3), Err(ControlError::CarDisabled(3)));
    }

    #[test]
    fn control_rejected_for_unknown_or_disabled_car() {
        let now = Instant::now();
        let mut state = arena(now);
        state.apply_hit(1, 3, now, &game()).unwrap();

        assert_eq!(
            state.apply_control(7, CarAction::Shoot, now),
            Err(ControlError::UnknownCar(7))
        );
        assert_eq!(
            state.apply_control(3, CarAction::Move(Motion::Forward), now),
            Err(ControlError::CarDisabled(3))
        );
        assert!(!state.car(3).unwrap().is_moving);
    }

    #[test]
    fn motion_watchdog_stops_idle_car() {
        let now = Instant::now();
        let mut state = arena(now);

        let address = state
            .apply_control(2, CarAction::Move(Motion::Forward), now)
            .unwrap();
        assert!(state.car(2).unwrap().is_moving);

        assert!(state.sweep(now + Duration::from_millis(500), &game()).is_empty());
        let stopped = state.sweep(now + Duration::from_millis(501), &game());
        assert_eq!(
            stopped,
            vec![TimerTransition::MotionTimedOut { car: 2, address }]
        );
        assert!(!state.car(2).unwrap().is_moving);

        state
            .apply_control(2, CarAction::Move(Motion::Left), now)
            .unwrap();
        state
            .apply_control(2, CarAction::Move(Motion::Stop), now)
            .unwrap();
        assert!(!state.car(2).unwrap().is_moving);
    }

    #[test]
    fn watchdog_disabled_without_command_timeout() {
        let now = Instant::now();
        let mut state = arena(now);
        state
            .apply_control(2, CarAction::Move(Motion::Backward), now)
            .unwrap();

        let no_watchdog = GameConfig {
            command_timeout: None,
            ..game()
        };
        assert!(state
            .sweep(now + Duration::from_secs(60), &no_watchdog)
            .is_empty());
        assert!(state.car(2).unwrap().is_moving);
    }
}
