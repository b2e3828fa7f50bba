//! Operator control requests
//!
//! The control panel never touches game state. It submits requests into the
//! game loop and waits for the loop's verdict on a oneshot channel.

use std::str::FromStr;

use tokio::sync::{mpsc, oneshot};

use crate::dispatch::{DeviceCommand, Motion};

use super::{CarId, TeamId};

/// Requests the control queue can hold before submitters wait
pub const CONTROL_QUEUE_DEPTH: usize = 64;

/// What an operator can make a car do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarAction {
    Move(Motion),
    Shoot,
}

impl CarAction {
    pub fn command(self) -> DeviceCommand {
        match self {
            CarAction::Move(motion) => DeviceCommand::Move(motion),
            CarAction::Shoot => DeviceCommand::Shoot,
        }
    }
}

impl FromStr for CarAction {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_ascii_lowercase();
        if name == "shoot" {
            return Ok(CarAction::Shoot);
        }
        name.parse::<Motion>()
            .map(CarAction::Move)
            .map_err(|_| ControlError::UnknownAction(s.to_string()))
    }
}

/// A request for the game loop, answered on `reply`
#[derive(Debug)]
pub enum ControlRequest {
    Act {
        car: CarId,
        action: CarAction,
        reply: oneshot::Sender<Result<(), ControlError>>,
    },
    AssignFlag {
        car: CarId,
        reply: oneshot::Sender<Result<(), ControlError>>,
    },
}

/// Cloneable submitter for control requests
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlRequest>,
}

impl ControlHandle {
    pub fn new(tx: mpsc::Sender<ControlRequest>) -> Self {
        Self { tx }
    }

    /// Create a handle and the receiving end the game loop drains
    pub fn channel() -> (Self, mpsc::Receiver<ControlRequest>) {
        let (tx, rx) = mpsc::channel(CONTROL_QUEUE_DEPTH);
        (Self::new(tx), rx)
    }

    /// Drive a car; rejected if it is unknown or disabled
    pub async fn act(&self, car: CarId, action: CarAction) -> Result<(), ControlError> {
        let (reply, verdict) = oneshot::channel();
        self.submit(ControlRequest::Act { car, action, reply }, verdict)
            .await
    }

    /// Hand the car's team flag to the car
    pub async fn assign_flag(&self, car: CarId) -> Result<(), ControlError> {
        let (reply, verdict) = oneshot::channel();
        self.submit(ControlRequest::AssignFlag { car, reply }, verdict)
            .await
    }

    async fn submit(
        &self,
        request: ControlRequest,
        verdict: oneshot::Receiver<Result<(), ControlError>>,
    ) -> Result<(), ControlError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| ControlError::Unavailable)?;
        verdict.await.map_err(|_| ControlError::Unavailable)?
    }
}

/// Why a control request was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("car {0} is not connected")]
    UnknownCar(CarId),

    #[error("car {0} is disabled")]
    CarDisabled(CarId),

    #[error("flag of team {team} is already held by car {holder}")]
    FlagHeld { team: TeamId, holder: CarId },

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("game loop is not running")]
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse_case_insensitively() {
        assert_eq!("shoot".parse::<CarAction>(), Ok(CarAction::Shoot));
        assert_eq!(
            "Forward".parse::<CarAction>(),
            Ok(CarAction::Move(Motion::Forward))
        );
        assert_eq!(
            "jump".parse::<CarAction>(),
            Err(ControlError::UnknownAction("jump".to_string()))
        );
    }

    #[test]
    fn actions_map_to_device_commands() {
        assert_eq!(CarAction::Shoot.command(), DeviceCommand::Shoot);
        assert_eq!(
            CarAction::Move(Motion::Stop).command(),
            DeviceCommand::Move(Motion::Stop)
        );
    }

    #[tokio::test]
    async fn requests_fail_when_loop_is_gone() {
        let (handle, rx) = ControlHandle::channel();
        drop(rx);
        assert_eq!(
            handle.act(1, CarAction::Shoot).await,
            Err(ControlError::Unavailable)
        );
    }

    #[tokio::test]
    async fn dropped_reply_is_unavailable() {
        let (handle, mut rx) = ControlHandle::channel();
        let responder = tokio::spawn(async move {
            // Take the request and drop it without answering
            let _ = rx.recv().await;
        });
        assert_eq!(handle.assign_flag(2).await, Err(ControlError::Unavailable));
        responder.await.unwrap();
    }
}
