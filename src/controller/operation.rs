//! High-level operations and their parameters.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::engine::piloting::PilotingAxes;
use crate::engine::types::{Accessory, FlipDirection};

/// Range a turn angle is clamped to, in degrees
pub const TURN_RANGE: std::ops::RangeInclusive<i32> = -180..=180;

/// Speeds of a move, in percent of the drone maximum
///
/// Positive values move forward, right, up and turn clockwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveParams {
    pub longitudinal_speed: i32,
    pub lateral_speed: i32,
    pub vertical_speed: i32,
    pub rotation_speed: i32,
}

impl MoveParams {
    /// Single-direction move at `speed` percent
    pub fn from_direction(direction: MoveDirection, speed: u8) -> Self {
        let speed = i32::from(speed);
        let mut params = MoveParams::default();
        match direction {
            MoveDirection::Forward => params.longitudinal_speed = speed,
            MoveDirection::Backward => params.longitudinal_speed = -speed,
            MoveDirection::Right => params.lateral_speed = speed,
            MoveDirection::Left => params.lateral_speed = -speed,
            MoveDirection::Up => params.vertical_speed = speed,
            MoveDirection::Down => params.vertical_speed = -speed,
        }
        params
    }

    /// Piloting axes, each clamped to [-100, 100]
    pub fn axes(&self) -> PilotingAxes {
        PilotingAxes::clamped(
            self.lateral_speed,
            self.longitudinal_speed,
            self.rotation_speed,
            self.vertical_speed,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDirection {
    Left,
    Right,
}

impl TurnDirection {
    /// Signed angle, left is counterclockwise
    pub fn signed_angle(&self, angle: u32) -> i32 {
        let angle = angle.min(i32::MAX as u32) as i32;
        match self {
            TurnDirection::Left => -angle,
            TurnDirection::Right => angle,
        }
    }
}

/// One user-requested action, tracked until a single terminal result
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    TakeOff,
    Land,
    /// Move for `duration`, or until stopped when `None`
    Move {
        params: MoveParams,
        duration: Option<Duration>,
    },
    StopMove,
    /// Relative heading change in degrees
    Turn { angle: i32 },
    Flip { direction: FlipDirection },
    /// Fire the cannon
    FireAccessory,
    /// Open the grabber
    OpenAccessory,
    /// Close the grabber
    CloseAccessory,
    TakePicture,
}

impl Operation {
    /// Accessory the operation targets, if any
    pub fn accessory(&self) -> Option<Accessory> {
        match self {
            Operation::FireAccessory => Some(Accessory::Cannon),
            Operation::OpenAccessory | Operation::CloseAccessory => Some(Accessory::Grabber),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directional_params() {
        let p = MoveParams::from_direction(MoveDirection::Backward, 50);
        assert_eq!(p.longitudinal_speed, -50);
        assert_eq!(p.axes().pitch, -50);

        let p = MoveParams::from_direction(MoveDirection::Left, 30);
        assert_eq!(p.axes().roll, -30);

        let p = MoveParams::from_direction(MoveDirection::Up, 70);
        assert_eq!(p.axes().gaz, 70);
        assert_eq!(p.axes().yaw, 0);
    }

    #[test]
    fn test_axes_mapping_and_clamping() {
        let p = MoveParams {
            longitudinal_speed: 10,
            lateral_speed: -250,
            vertical_speed: 30,
            rotation_speed: 400,
        };
        assert_eq!(p.axes(), PilotingAxes::clamped(-100, 10, 100, 30));
    }

    #[test]
    fn test_turn_direction_sign() {
        assert_eq!(TurnDirection::Left.signed_angle(90), -90);
        assert_eq!(TurnDirection::Right.signed_angle(45), 45);
    }

    #[test]
    fn test_operation_accessory() {
        assert_eq!(Operation::FireAccessory.accessory(), Some(Accessory::Cannon));
        assert_eq!(Operation::CloseAccessory.accessory(), Some(Accessory::Grabber));
        assert_eq!(Operation::TakeOff.accessory(), None);
    }
}
