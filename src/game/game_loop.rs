//! The authoritative game loop
//!
//! Sole owner of [`GameState`]. Ingestion workers feed it [`Event`]s, the
//! control panel feeds it [`ControlRequest`]s, and it answers with device
//! commands through the [`ConnectionDirectory`] and with snapshots on a
//! watch channel.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::GameConfig;
use crate::directory::DeviceDirectory;
use crate::dispatch::{ConnectionDirectory, DeviceCommand, Motion};

use super::control::ControlRequest;
use super::registry::{GameState, SafetyChange, TimerTransition};
use super::snapshot::GameSnapshot;
use super::{Device, DeviceKind, Event};

/// Events applied per iteration before the timers get another turn
const MAX_EVENTS_PER_TICK: usize = 256;

/// What woke the loop up
enum Wake {
    Event(Event),
    Control(ControlRequest),
    Tick,
}

pub struct GameLoop {
    state: GameState,
    events: mpsc::Receiver<Event>,
    control: mpsc::Receiver<ControlRequest>,
    connections: Arc<ConnectionDirectory>,
    directory: Arc<DeviceDirectory>,
    game: GameConfig,
    snapshot_tx: watch::Sender<GameSnapshot>,
    shutdown: watch::Receiver<bool>,
    tick: u64,
}

impl GameLoop {
    /// Create the loop and the receiving side of its snapshot feed
    pub fn new(
        events: mpsc::Receiver<Event>,
        control: mpsc::Receiver<ControlRequest>,
        connections: Arc<ConnectionDirectory>,
        directory: Arc<DeviceDirectory>,
        game: GameConfig,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, watch::Receiver<GameSnapshot>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(GameSnapshot::default());
        let game_loop = Self {
            state: GameState::new(),
            events,
            control,
            connections,
            directory,
            game,
            snapshot_tx,
            shutdown,
            tick: 0,
        };
        (game_loop, snapshot_rx)
    }

    /// Run until shutdown or until every event producer is gone
    pub async fn run(mut self) {
        info!(
            tick_ms = self.game.tick_interval.as_millis() as u64,
            penalty_secs = self.game.penalty_duration.as_secs(),
            "Game loop started"
        );

        loop {
            let wake = tokio::select! {
                biased;
                _ = self.shutdown.changed() => {
                    info!("Game loop stopping on shutdown");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(event) => Wake::Event(event),
                    None => {
                        info!("Event channel closed, game loop stopping");
                        break;
                    }
                },
                Some(request) = self.control.recv() => Wake::Control(request),
                _ = sleep(self.game.tick_interval) => Wake::Tick,
            };

            let now = Instant::now();

            // Timers first so bursts of events cannot starve them
            let mut changed = self.sweep_timers(now);

            match wake {
                Wake::Event(event) => changed |= self.apply_event(event, now),
                Wake::Control(request) => changed |= self.handle_control(request, now),
                Wake::Tick => {}
            }

            changed |= self.drain(now);
            self.tick += 1;

            if changed {
                self.publish(now);
            }
        }

        info!(ticks = self.tick, "Game loop ended");
    }

    /// Apply whatever is already queued without waiting for more
    fn drain(&mut self, now: Instant) -> bool {
        let mut changed = false;
        for _ in 0..MAX_EVENTS_PER_TICK {
            match self.events.try_recv() {
                Ok(event) => changed |= self.apply_event(event, now),
                Err(_) => break,
            }
        }
        while let Ok(request) = self.control.try_recv() {
            changed |= self.handle_control(request, now);
        }
        changed
    }

    fn publish(&self, now: Instant) {
        let snapshot = GameSnapshot::build(self.tick, &self.state, now);
        self.snapshot_tx.send_replace(snapshot);
    }

    fn sweep_timers(&mut self, now: Instant) -> bool {
        let transitions = self.state.sweep(now, &self.game);
        let changed = !transitions.is_empty();

        for transition in transitions {
            match transition {
                TimerTransition::ReEnabled { car, address } => {
                    info!(car_id = car, "Penalty over, car re-enabled");
                    self.send(address, DeviceCommand::Enable);
                }
                TimerTransition::SafeZoneExpired(change) => {
                    self.log_safety_change(&change, "timeout");
                }
                TimerTransition::MotionTimedOut { car, address } => {
                    info!(car_id = car, "No operator command in time, stopping car");
                    self.send(address, DeviceCommand::Move(Motion::Stop));
                }
            }
        }

        changed
    }

    fn apply_event(&mut self, event: Event, now: Instant) -> bool {
        match event {
            Event::DeviceConnected(device) => {
                self.handle_connect(device);
                true
            }
            Event::DeviceDisconnected {
                kind,
                id,
                address,
                session,
            } => {
                if self.state.remove_device(kind, id, session) {
                    info!(kind = %kind, id, addr = %address, session, "Device left the game");
                    true
                } else {
                    debug!(kind = %kind, id, session, "Disconnect for stale or unknown device ignored");
                    false
                }
            }
            Event::CarSighted { shooter, target } => self.handle_car_sighting(shooter, target, now),
            Event::BaseStationSighted { base_station, car } => {
                self.state.touch(DeviceKind::BaseStation, base_station, now);
                match self.state.apply_station_sighting(base_station, car, now) {
                    Some(change) => {
                        self.log_safety_change(&change, "sighting");
                        true
                    }
                    None => false,
                }
            }
        }
    }

    fn handle_connect(&mut self, device: Device) {
        let kind = device.kind();
        let id = device.id();
        let team = self.directory.team_name(device.team());
        let address = device.address();
        let session = device.session();

        if self.state.insert_device(device) {
            info!(kind = %kind, id, team = %team, addr = %address, session, "Device rejoined, previous entry replaced");
        } else {
            info!(kind = %kind, id, team = %team, addr = %address, session, "Device joined the game");
        }
    }

    fn handle_car_sighting(&mut self, shooter: u8, target: u8, now: Instant) -> bool {
        self.state.touch(DeviceKind::Car, shooter, now);

        match self.state.apply_hit(shooter, target, now, &self.game) {
            Ok(tag) => {
                info!(
                    shooter_id = tag.shooter,
                    target_id = tag.target,
                    penalty_secs = self.game.penalty_duration.as_secs(),
                    "Car tagged, disabling"
                );
                self.send(tag.target_address, DeviceCommand::Disable);
                true
            }
            Err(reason) => {
                debug!(shooter_id = shooter, target_id = target, ?reason, "Sighting did not count as a hit");
                false
            }
        }
    }

    fn handle_control(&mut self, request: ControlRequest, now: Instant) -> bool {
        match request {
            ControlRequest::Act { car, action, reply } => {
                let result = self.state.apply_control(car, action, now);
                let changed = result.is_ok();
                let verdict = result.map(|address| {
                    debug!(car_id = car, ?action, "Operator command");
                    self.send(address, action.command());
                });
                let _ = reply.send(verdict);
                changed
            }
            ControlRequest::AssignFlag { car, reply } => {
                let result = self.state.assign_flag(car);
                let changed = matches!(result, Ok(true));
                if changed {
                    info!(car_id = car, "Car now carries its team flag");
                }
                let _ = reply.send(result.map(|_| ()));
                changed
            }
        }
    }

    fn log_safety_change(&self, change: &SafetyChange, cause: &'static str) {
        let team = self.directory.team_name(change.team);
        if change.safe {
            info!(car_id = change.car, team = %team, "Car entered its safe zone");
        } else {
            info!(car_id = change.car, team = %team, cause, "Car left its safe zone");
        }
        if change.flag_captured {
            info!(car_id = change.car, team = %team, "Flag captured");
        }
    }

    /// Hand a command to the dispatcher; failures are logged and dropped
    fn send(&self, address: IpAddr, command: DeviceCommand) {
        if let Err(e) = self.connections.dispatch(address, command) {
            warn!(addr = %address, command = %command, error = %e, "Command dropped");
        }
    }
}
