//! Outbound command set and its wire encoding
//!
//! Every command is an (address, command) byte pair. On the wire it travels
//! as four uppercase hex digits and a newline, e.g. `8001\n`.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

/// Subsystem that reacts to penalty commands
pub const GAME_STATE_ADDRESS: u8 = 0x80;
/// Motor driver
pub const MOTION_ADDRESS: u8 = 0x02;
/// Infrared emitter trigger
pub const WEAPON_ADDRESS: u8 = 0x03;

/// Motion commands understood by a car's motor driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Motion {
    const fn code(self) -> u8 {
        match self {
            Motion::Forward => 0x01,
            Motion::Backward => 0x02,
            Motion::Left => 0x03,
            Motion::Right => 0x04,
            Motion::Stop => 0x05,
        }
    }
}

impl FromStr for Motion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(Motion::Forward),
            "backward" => Ok(Motion::Backward),
            "left" => Ok(Motion::Left),
            "right" => Ok(Motion::Right),
            "stop" => Ok(Motion::Stop),
            _ => Err(()),
        }
    }
}

/// Everything the server can tell a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Tag penalty starts
    Disable,
    /// Tag penalty is over
    Enable,
    Move(Motion),
    Shoot,
}

impl DeviceCommand {
    /// The (address, command) byte pair
    pub const fn code(self) -> (u8, u8) {
        match self {
            DeviceCommand::Disable => (GAME_STATE_ADDRESS, 0x01),
            DeviceCommand::Enable => (GAME_STATE_ADDRESS, 0x02),
            DeviceCommand::Move(motion) => (MOTION_ADDRESS, motion.code()),
            DeviceCommand::Shoot => (WEAPON_ADDRESS, 0x01),
        }
    }

    /// Wire form of this command
    pub fn encode(self) -> Bytes {
        let (address, command) = self.code();
        encode(address, command)
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::Disable => write!(f, "disable"),
            DeviceCommand::Enable => write!(f, "re-enable"),
            DeviceCommand::Move(motion) => write!(f, "move {:?}", motion),
            DeviceCommand::Shoot => write!(f, "shoot"),
        }
    }
}

/// Encode an (address, command) pair as `AACC\n`
pub fn encode(address: u8, command: u8) -> Bytes {
    Bytes::from(format!("{:02X}{:02X}\n", address, command))
}
