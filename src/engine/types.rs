//! # Drone Domain Types
//!
//! Device identity, flying state, battery and accessory models, and the
//! notifications the protocol engine raises.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Drone family, from the discovery manufacturer data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Model {
    RollingSpider,
    Night,
    Cargo,
    Mambo,
}

impl Model {
    /// Map the low byte of the BLE product id
    pub fn from_product_id(id: u8) -> Option<Self> {
        match id {
            0x00 => Some(Model::RollingSpider),
            0x07 => Some(Model::Night),
            0x09 => Some(Model::Cargo),
            0x0B => Some(Model::Mambo),
            _ => None,
        }
    }

    pub fn product_id(&self) -> u8 {
        match self {
            Model::RollingSpider => 0x00,
            Model::Night => 0x07,
            Model::Cargo => 0x09,
            Model::Mambo => 0x0B,
        }
    }

    /// False for families that never send a product-model event
    pub fn has_sub_model(&self) -> bool {
        !matches!(self, Model::RollingSpider | Model::Mambo)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Model::RollingSpider => "Rolling Spider",
            Model::Night => "Airborne Night",
            Model::Cargo => "Airborne Cargo",
            Model::Mambo => "Mambo",
        };
        f.write_str(name)
    }
}

/// Product variant, from the product-model event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubModel {
    Travis = 0,
    Mars = 1,
    Swat = 2,
    Mclane = 3,
    Blaze = 4,
    Orak = 5,
    NewZ = 6,
    SwingBlack = 13,
    SwingWhite = 14,
}

impl SubModel {
    /// Map a raw product-model value; jumping-sumo values are not minidrones
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(SubModel::Travis),
            1 => Some(SubModel::Mars),
            2 => Some(SubModel::Swat),
            3 => Some(SubModel::Mclane),
            4 => Some(SubModel::Blaze),
            5 => Some(SubModel::Orak),
            6 => Some(SubModel::NewZ),
            13 => Some(SubModel::SwingBlack),
            14 => Some(SubModel::SwingWhite),
            _ => None,
        }
    }
}

/// Who we are talking to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub name: String,
    pub model: Model,
    pub sub_model: Option<SubModel>,
}

/// Raw flying-state value the drone reports while still booting
pub const FLYING_STATE_NOT_READY: u8 = 7;

/// Flying state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlyingState {
    #[default]
    Landed,
    TakingOff,
    Flying,
    Landing,
    Emergency,
}

impl FlyingState {
    /// Map a raw flying-state value; unknown values read as landed
    pub fn from_raw(value: u8) -> Self {
        match value {
            0 => FlyingState::Landed,
            1 => FlyingState::TakingOff,
            2 | 3 => FlyingState::Flying,
            4 => FlyingState::Landing,
            5 => FlyingState::Emergency,
            _ => FlyingState::Landed,
        }
    }

    /// True if the raw value means the drone is not ready yet
    pub fn is_initializing(value: u8) -> bool {
        value == FLYING_STATE_NOT_READY
    }
}

/// Battery level with the sticky low-battery alert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryLevel {
    /// Percentage, `None` until first reported
    pub percent: Option<u8>,

    /// Set by a device alert; only reconnection clears it
    pub low: bool,
}

/// Flip direction, wire values of the flip command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipDirection {
    Front = 0,
    Back = 1,
    Right = 2,
    Left = 3,
}

/// Detachable modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessory {
    Grabber,
    Cannon,
    Light,
}

impl fmt::Display for Accessory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Accessory::Grabber => "grabber",
            Accessory::Cannon => "cannon",
            Accessory::Light => "light",
        };
        f.write_str(name)
    }
}

/// Accessory light state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightState {
    Off,
    On(u8),
    Blink,
    Oscillate,
}

impl LightState {
    /// Map a reported `(state, intensity)` pair
    pub fn from_raw(state: u32, intensity: u8) -> Self {
        match state {
            0 if intensity == 0 => LightState::Off,
            0 => LightState::On(intensity),
            1 => LightState::Blink,
            2 => LightState::Oscillate,
            _ => LightState::Off,
        }
    }

    /// `(mode, intensity)` arguments of the light control command
    pub fn control_args(&self) -> (u32, u8) {
        match self {
            LightState::Off => (0, 0),
            LightState::On(intensity) => (0, *intensity),
            LightState::Blink => (1, 0),
            LightState::Oscillate => (2, 0),
        }
    }
}

/// Bit of an accessory list-flags byte telling the accessory is plugged
pub const ACCESSORY_PRESENT_FLAG: u8 = 0x02;

/// Notifications raised by the protocol engine
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Device identity became known (or gained its sub-model)
    Connecting(DeviceIdentity),
    /// Handshake done and the drone is ready
    Connected,
    /// Firmware below the per-model minimum; advisory only
    FirmwareOutOfDate { version: String },
    FlyingStateChanged(FlyingState),
    /// A timed piloting command has ended
    PilotingTerminated,
    BatteryChanged(BatteryLevel),
    PictureStateChanged { ready: bool },
    Grabber { present: bool, id: u8, opened: bool },
    Cannon { present: bool, id: u8, ready: bool },
    Light { present: bool, id: u8, state: LightState },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_product_ids() {
        for model in [Model::RollingSpider, Model::Night, Model::Cargo, Model::Mambo] {
            assert_eq!(Model::from_product_id(model.product_id()), Some(model));
        }
        assert_eq!(Model::from_product_id(0x0C), None);
    }

    #[test]
    fn test_models_without_sub_model() {
        assert!(!Model::Mambo.has_sub_model());
        assert!(!Model::RollingSpider.has_sub_model());
        assert!(Model::Cargo.has_sub_model());
        assert!(Model::Night.has_sub_model());
    }

    #[test]
    fn test_sub_model_mapping() {
        assert_eq!(SubModel::from_raw(1), Some(SubModel::Mars));
        assert_eq!(SubModel::from_raw(14), Some(SubModel::SwingWhite));
        assert_eq!(SubModel::from_raw(9), None);
    }

    #[test]
    fn test_flying_state_mapping() {
        assert_eq!(FlyingState::from_raw(0), FlyingState::Landed);
        assert_eq!(FlyingState::from_raw(1), FlyingState::TakingOff);
        assert_eq!(FlyingState::from_raw(2), FlyingState::Flying);
        assert_eq!(FlyingState::from_raw(3), FlyingState::Flying);
        assert_eq!(FlyingState::from_raw(4), FlyingState::Landing);
        assert_eq!(FlyingState::from_raw(5), FlyingState::Emergency);
        assert_eq!(FlyingState::from_raw(6), FlyingState::Landed);
        assert_eq!(FlyingState::from_raw(7), FlyingState::Landed);
    }

    #[test]
    fn test_initializing_value() {
        assert!(FlyingState::is_initializing(7));
        assert!(!FlyingState::is_initializing(0));
        assert!(!FlyingState::is_initializing(2));
    }

    #[test]
    fn test_light_state_mapping() {
        assert_eq!(LightState::from_raw(0, 0), LightState::Off);
        assert_eq!(LightState::from_raw(0, 40), LightState::On(40));
        assert_eq!(LightState::from_raw(1, 0), LightState::Blink);
        assert_eq!(LightState::from_raw(2, 9), LightState::Oscillate);
        assert_eq!(LightState::from_raw(8, 9), LightState::Off);
        assert_eq!(LightState::On(70).control_args(), (0, 70));
        assert_eq!(LightState::Oscillate.control_args(), (2, 0));
    }

    #[test]
    fn test_flip_direction_values() {
        assert_eq!(FlipDirection::Front as u32, 0);
        assert_eq!(FlipDirection::Left as u32, 3);
    }
}
