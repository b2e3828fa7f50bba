//! Inbound device line protocol
//!
//! Devices send one `TAG:HH` message per line, where `HH` is the hex
//! sighting code of the car they detected. Cars report `CAR_SEEN`, base
//! stations report `BS_SEEN`.

use crate::directory::SightingCode;
use crate::game::DeviceKind;

/// Longest line a device may send, separator and newline included
pub const MAX_LINE_LEN: usize = 256;

pub const CAR_SEEN: &str = "CAR_SEEN";
pub const BS_SEEN: &str = "BS_SEEN";

/// Tag a device of `kind` must use
pub fn expected_tag(kind: DeviceKind) -> &'static str {
    match kind {
        DeviceKind::Car => CAR_SEEN,
        DeviceKind::BaseStation => BS_SEEN,
    }
}

/// Parse one line from a device of `kind`
///
/// Returns `Ok(None)` for blank lines. A trailing `\r` is ignored.
pub fn parse_line(kind: DeviceKind, line: &str) -> Result<Option<SightingCode>, ProtocolError> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.trim().is_empty() {
        return Ok(None);
    }

    let (tag, payload) = line
        .split_once(':')
        .ok_or(ProtocolError::MissingSeparator)?;

    if tag != expected_tag(kind) {
        return Err(ProtocolError::UnexpectedTag {
            kind,
            tag: tag.to_string(),
        });
    }

    parse_code(payload).map(Some)
}

fn parse_code(payload: &str) -> Result<SightingCode, ProtocolError> {
    if payload.len() != 2 || !payload.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ProtocolError::InvalidCode(payload.to_string()));
    }
    u8::from_str_radix(payload, 16).map_err(|_| ProtocolError::InvalidCode(payload.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("line has no TAG:PAYLOAD separator")]
    MissingSeparator,

    #[error("tag {tag:?} is not valid for a {kind}")]
    UnexpectedTag { kind: DeviceKind, tag: String },

    #[error("payload {0:?} is not a two digit hex code")]
    InvalidCode(String),

    #[error("line longer than 256 bytes")]
    TooLong,

    #[error("line is not valid UTF-8")]
    NotUtf8,
}
