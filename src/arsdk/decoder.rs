//! # ARSDK Event Decoder
//!
//! Decodes drone event frames into typed [`Event`]s.
//!
//! Decoding is best effort: a frame whose id triple is not in the catalog, or
//! whose payload is shorter than the event requires, yields `None`. Such
//! frames are dropped by the caller, never reported as errors.

use super::protocol::*;

/// Bounds-checked little-endian reader over a frame payload
#[derive(Debug)]
pub struct FrameReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    /// Reader positioned at the start of the payload
    pub fn new(frame: &'a [u8]) -> Self {
        Self {
            data: frame,
            pos: HEADER_SIZE,
        }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let bytes: [u8; N] = self.data.get(self.pos..end)?.try_into().ok()?;
        self.pos = end;
        Some(bytes)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|b| b[0])
    }

    pub fn read_i8(&mut self) -> Option<i8> {
        self.take::<1>().map(|b| b[0] as i8)
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        self.take().map(u16::from_le_bytes)
    }

    pub fn read_i16(&mut self) -> Option<i16> {
        self.take().map(i16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Option<i32> {
        self.take().map(i32::from_le_bytes)
    }

    pub fn read_f32(&mut self) -> Option<f32> {
        self.take().map(f32::from_le_bytes)
    }

    /// Read a zero-terminated string
    ///
    /// A missing terminator ends the string at the end of the frame.
    pub fn read_str(&mut self) -> Option<String> {
        let rest = self.data.get(self.pos..)?;
        let len = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let value = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += (len + 1).min(rest.len());
        Some(value)
    }
}

/// Events received from the drone
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    AllSettingsSent,
    AllStateSent,
    BatteryStateChanged { level: u8 },
    ProductModel { model: u8 },
    MaxTiltChanged { value: f32, min: f32, max: f32 },
    MaxVerticalSpeedChanged { value: f32, min: f32, max: f32 },
    MaxRotationSpeedChanged { value: f32, min: f32, max: f32 },
    FlyingStateChanged { state: u8 },
    AlertStateChanged { alert: u8 },
    PictureStateChanged { state: u8 },
    SoftwareVersion { version: String },
    AccessoryLightState {
        id: u8,
        state: u32,
        intensity: u8,
        list_flags: u8,
    },
    AccessoryGrabberState { id: u8, state: u32, list_flags: u8 },
    AccessoryCannonState { id: u8, state: u32, list_flags: u8 },
}

/// Decode an event frame
///
/// # Arguments
///
/// * `frame` - Complete frame bytes, header included
///
/// # Returns
///
/// * `Option<Event>` - Decoded event, or `None` for unknown or truncated frames
///
/// # Examples
///
/// ```
/// use minidrone::arsdk::decoder::{decode, Event};
///
/// let event = decode(&[4, 1, 0, 5, 1, 0, 87]);
/// assert_eq!(event, Some(Event::BatteryStateChanged { level: 87 }));
/// assert_eq!(decode(&[4, 1, 9, 9, 9, 0]), None);
/// ```
pub fn decode(frame: &[u8]) -> Option<Event> {
    let header = FrameHeader::parse(frame)?;
    let mut r = FrameReader::new(frame);

    let event = match header.id {
        events::ALL_SETTINGS_SENT => Event::AllSettingsSent,
        events::ALL_STATE_SENT => Event::AllStateSent,
        events::BATTERY_STATE_CHANGED => Event::BatteryStateChanged {
            level: r.read_u8()?,
        },
        events::PRODUCT_MODEL => Event::ProductModel {
            model: r.read_u8()?,
        },
        events::MAX_TILT_CHANGED => Event::MaxTiltChanged {
            value: r.read_f32()?,
            min: r.read_f32()?,
            max: r.read_f32()?,
        },
        events::MAX_VERTICAL_SPEED_CHANGED => Event::MaxVerticalSpeedChanged {
            value: r.read_f32()?,
            min: r.read_f32()?,
            max: r.read_f32()?,
        },
        events::MAX_ROTATION_SPEED_CHANGED => Event::MaxRotationSpeedChanged {
            value: r.read_f32()?,
            min: r.read_f32()?,
            max: r.read_f32()?,
        },
        events::FLYING_STATE_CHANGED => Event::FlyingStateChanged {
            state: r.read_u8()?,
        },
        events::ALERT_STATE_CHANGED => Event::AlertStateChanged {
            alert: r.read_u8()?,
        },
        events::PICTURE_STATE_CHANGED => Event::PictureStateChanged {
            state: r.read_u8()?,
        },
        events::SOFTWARE_VERSION => Event::SoftwareVersion {
            version: r.read_str()?,
        },
        events::ACCESSORY_LIGHT_STATE => Event::AccessoryLightState {
            id: r.read_u8()?,
            state: r.read_u32()?,
            intensity: r.read_u8()?,
            list_flags: r.read_u8()?,
        },
        events::ACCESSORY_GRABBER_STATE => Event::AccessoryGrabberState {
            id: r.read_u8()?,
            state: r.read_u32()?,
            list_flags: r.read_u8()?,
        },
        events::ACCESSORY_CANNON_STATE => Event::AccessoryCannonState {
            id: r.read_u8()?,
            state: r.read_u32()?,
            list_flags: r.read_u8()?,
        },
        _ => return None,
    };

    Some(event)
}
