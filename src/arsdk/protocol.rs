//! # ARSDK Protocol Constants and Types
//!
//! Core frame definitions for the minidrone BLE command protocol.
//!
//! Frame structure:
//!
//! ```text
//! +------+-------+---------+-------+---------+----------+-----------------+
//! | type | seqNr | project | class | command | reserved | payload...      |
//! +------+-------+---------+-------+---------+----------+-----------------+
//!   0      1       2         3       4         5          6..
//! ```
//!
//! Ack frames are exactly three bytes: `[ACK, localSeq, echoedRemoteSeq]`.

use std::fmt;

use crate::error::{MinidroneError, Result};

/// Acknowledgment of a received frame
pub const FRAME_TYPE_ACK: u8 = 1;

/// Data frame, no acknowledgment expected
pub const FRAME_TYPE_DATA: u8 = 2;

/// Data frame the receiver must acknowledge
pub const FRAME_TYPE_DATA_WITH_ACK: u8 = 4;

/// Type byte of every command frame, on the ack and no-ack channels alike
pub const FRAME_TYPE_COMMAND: u8 = FRAME_TYPE_DATA_WITH_ACK;

/// Offset of the frame type byte
pub const TYPE_OFFSET: usize = 0;

/// Offset of the sequence number byte
pub const SEQ_OFFSET: usize = 1;

/// Offset of the project id
pub const PROJECT_OFFSET: usize = 2;

/// Offset of the class id
pub const CLASS_OFFSET: usize = 3;

/// Offset of the command id
pub const COMMAND_OFFSET: usize = 4;

/// Header size; the payload starts right after it
pub const HEADER_SIZE: usize = 6;

/// Ack frame size
pub const ACK_FRAME_SIZE: usize = 3;

/// Largest frame a single BLE characteristic write can carry
pub const MAX_FRAME_SIZE: usize = 20;

/// `(project, class, command)` triple identifying a command or an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId {
    /// Project (0 = common, 2 = minidrone)
    pub project: u8,

    /// Class within the project
    pub class: u8,

    /// Command within the class
    pub command: u8,
}

impl CommandId {
    pub const fn new(project: u8, class: u8, command: u8) -> Self {
        Self {
            project,
            class,
            command,
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.project, self.class, self.command)
    }
}

/// Command id triples sent to the drone
pub mod commands {
    use super::CommandId;

    pub const SET_DATE: CommandId = CommandId::new(0, 4, 1);
    pub const SET_TIME: CommandId = CommandId::new(0, 4, 2);
    pub const GET_ALL_SETTINGS: CommandId = CommandId::new(0, 2, 0);
    pub const GET_ALL_STATES: CommandId = CommandId::new(0, 4, 0);
    pub const HAS_HULL: CommandId = CommandId::new(0, 26, 0);
    pub const TAKE_OFF: CommandId = CommandId::new(2, 0, 1);
    pub const PCMD: CommandId = CommandId::new(2, 0, 2);
    pub const LAND: CommandId = CommandId::new(2, 0, 3);
    pub const MAX_VERTICAL_SPEED: CommandId = CommandId::new(2, 1, 0);
    pub const MAX_ROTATION_SPEED: CommandId = CommandId::new(2, 1, 1);
    pub const HAS_WHEELS: CommandId = CommandId::new(2, 1, 2);
    pub const FLIP: CommandId = CommandId::new(2, 4, 0);
    pub const CAP: CommandId = CommandId::new(2, 4, 1);
    pub const TAKE_PICTURE: CommandId = CommandId::new(2, 6, 1);
    pub const MAX_TILT: CommandId = CommandId::new(2, 8, 1);
    pub const CUTOUT_MODE: CommandId = CommandId::new(2, 10, 0);
    pub const USB_LIGHT_CONTROL: CommandId = CommandId::new(2, 16, 0);
    pub const USB_GRABBER_CONTROL: CommandId = CommandId::new(2, 16, 1);
    pub const USB_CANNON_CONTROL: CommandId = CommandId::new(2, 16, 2);
}

/// Event id triples received from the drone
pub mod events {
    use super::CommandId;

    pub const ALL_SETTINGS_SENT: CommandId = CommandId::new(0, 3, 0);
    pub const SOFTWARE_VERSION: CommandId = CommandId::new(0, 3, 3);
    pub const ALL_STATE_SENT: CommandId = CommandId::new(0, 5, 0);
    pub const BATTERY_STATE_CHANGED: CommandId = CommandId::new(0, 5, 1);
    pub const PRODUCT_MODEL: CommandId = CommandId::new(0, 5, 9);
    pub const FLYING_STATE_CHANGED: CommandId = CommandId::new(2, 3, 1);
    pub const ALERT_STATE_CHANGED: CommandId = CommandId::new(2, 3, 2);
    pub const MAX_VERTICAL_SPEED_CHANGED: CommandId = CommandId::new(2, 5, 0);
    pub const MAX_ROTATION_SPEED_CHANGED: CommandId = CommandId::new(2, 5, 1);
    pub const PICTURE_STATE_CHANGED: CommandId = CommandId::new(2, 7, 1);
    pub const MAX_TILT_CHANGED: CommandId = CommandId::new(2, 9, 1);
    pub const ACCESSORY_LIGHT_STATE: CommandId = CommandId::new(2, 15, 0);
    pub const ACCESSORY_GRABBER_STATE: CommandId = CommandId::new(2, 15, 1);
    pub const ACCESSORY_CANNON_STATE: CommandId = CommandId::new(2, 15, 2);
}

/// Parsed fixed header of a data frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame type byte
    pub frame_type: u8,

    /// Sender-side sequence number
    pub seq: u8,

    /// Command or event id
    pub id: CommandId,
}

impl FrameHeader {
    /// Parse the fixed 6-byte header
    ///
    /// Returns `None` if the frame is shorter than [`HEADER_SIZE`].
    pub fn parse(frame: &[u8]) -> Option<Self> {
        if frame.len() < HEADER_SIZE {
            return None;
        }

        Some(Self {
            frame_type: frame[TYPE_OFFSET],
            seq: frame[SEQ_OFFSET],
            id: CommandId::new(
                frame[PROJECT_OFFSET],
                frame[CLASS_OFFSET],
                frame[COMMAND_OFFSET],
            ),
        })
    }
}

/// Build the 3-byte acknowledgment of a received frame
///
/// # Arguments
///
/// * `local_seq` - Sequence number of the ack stream
/// * `received` - Frame being acknowledged (its byte 1 is echoed back)
///
/// # Errors
///
/// Returns error if `received` has no sequence byte.
pub fn ack_frame(local_seq: u8, received: &[u8]) -> Result<[u8; ACK_FRAME_SIZE]> {
    let remote_seq = received.get(SEQ_OFFSET).copied().ok_or_else(|| {
        MinidroneError::Protocol(format!(
            "Cannot acknowledge a {}-byte frame",
            received.len()
        ))
    })?;

    Ok([FRAME_TYPE_ACK, local_seq, remote_seq])
}
