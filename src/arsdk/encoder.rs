//! # ARSDK Command Encoder
//!
//! Encodes drone commands into protocol frames.
//!
//! Arguments are written in declaration order right after the 6-byte header,
//! using little-endian fixed-width integers and floats. Strings are written as
//! raw UTF-8 bytes followed by a single zero byte. There is no length field
//! and no checksum: the length is implied by the command id.

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, TimeZone};
use std::fmt::Display;

use super::protocol::*;
use crate::error::{MinidroneError, Result};

/// Frame builder with primitive append helpers
///
/// The sequence number is left at zero; the outbound channel fills it in.
#[derive(Debug)]
pub struct FrameWriter {
    buf: BytesMut,
}

impl FrameWriter {
    /// Start a frame: type, zero seq, id triple, reserved byte
    pub fn new(frame_type: u8, id: CommandId) -> Self {
        let mut buf = BytesMut::with_capacity(MAX_FRAME_SIZE);
        buf.put_u8(frame_type);
        buf.put_u8(0);
        buf.put_u8(id.project);
        buf.put_u8(id.class);
        buf.put_u8(id.command);
        buf.put_u8(0);
        Self { buf }
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn put_i8(&mut self, value: i8) -> &mut Self {
        self.buf.put_i8(value);
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    pub fn put_i16(&mut self, value: i16) -> &mut Self {
        self.buf.put_i16_le(value);
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32_le(value);
        self
    }

    pub fn put_f32(&mut self, value: f32) -> &mut Self {
        self.buf.put_f32_le(value);
        self
    }

    /// Append a zero-terminated string
    pub fn put_str(&mut self, value: &str) -> &mut Self {
        self.buf.put_slice(value.as_bytes());
        self.buf.put_u8(0);
        self
    }

    /// Finish the frame
    ///
    /// # Errors
    ///
    /// Returns error if the frame exceeds [`MAX_FRAME_SIZE`].
    pub fn finish(self) -> Result<BytesMut> {
        if self.buf.len() > MAX_FRAME_SIZE {
            return Err(MinidroneError::Protocol(format!(
                "Frame size {} exceeds maximum {}",
                self.buf.len(),
                MAX_FRAME_SIZE
            )));
        }
        Ok(self.buf)
    }
}

/// Commands that can be sent to the drone
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Local date, `YYYY-MM-DD`
    SetDate(String),
    /// Local time, `THHMMSS+HHMM`
    SetTime(String),
    GetAllSettings,
    GetAllStates,
    TakeOff,
    Land,
    /// Piloting command; `flag` is set when roll or pitch is in use
    Pcmd {
        flag: bool,
        roll: i8,
        pitch: i8,
        yaw: i8,
        gaz: i8,
    },
    /// Relative heading change in degrees
    Cap { angle: i16 },
    Flip { direction: u32 },
    SetMaxTilt(f32),
    SetMaxVerticalSpeed(f32),
    SetMaxRotationSpeed(f32),
    CutOutMode(u8),
    TakePicture,
    HasWheels(bool),
    HasHull(bool),
    UsbLightControl { id: u8, mode: u32, intensity: u8 },
    UsbGrabberControl { id: u8, action: u32 },
    UsbCannonControl { id: u8, action: u32 },
}

impl Command {
    /// `SetDate` for the given instant
    pub fn set_date<Tz: TimeZone>(now: &DateTime<Tz>) -> Self
    where
        Tz::Offset: Display,
    {
        Command::SetDate(now.format("%Y-%m-%d").to_string())
    }

    /// `SetTime` for the given instant
    pub fn set_time<Tz: TimeZone>(now: &DateTime<Tz>) -> Self
    where
        Tz::Offset: Display,
    {
        Command::SetTime(now.format("T%H%M%S%z").to_string())
    }

    /// Id triple of this command
    pub fn id(&self) -> CommandId {
        match self {
            Command::SetDate(_) => commands::SET_DATE,
            Command::SetTime(_) => commands::SET_TIME,
            Command::GetAllSettings => commands::GET_ALL_SETTINGS,
            Command::GetAllStates => commands::GET_ALL_STATES,
            Command::TakeOff => commands::TAKE_OFF,
            Command::Land => commands::LAND,
            Command::Pcmd { .. } => commands::PCMD,
            Command::Cap { .. } => commands::CAP,
            Command::Flip { .. } => commands::FLIP,
            Command::SetMaxTilt(_) => commands::MAX_TILT,
            Command::SetMaxVerticalSpeed(_) => commands::MAX_VERTICAL_SPEED,
            Command::SetMaxRotationSpeed(_) => commands::MAX_ROTATION_SPEED,
            Command::CutOutMode(_) => commands::CUTOUT_MODE,
            Command::TakePicture => commands::TAKE_PICTURE,
            Command::HasWheels(_) => commands::HAS_WHEELS,
            Command::HasHull(_) => commands::HAS_HULL,
            Command::UsbLightControl { .. } => commands::USB_LIGHT_CONTROL,
            Command::UsbGrabberControl { .. } => commands::USB_GRABBER_CONTROL,
            Command::UsbCannonControl { .. } => commands::USB_CANNON_CONTROL,
        }
    }

    /// Encode this command into a complete frame
    ///
    /// # Arguments
    ///
    /// * `frame_type` - Frame type byte, fixed by the sending channel
    ///
    /// # Returns
    ///
    /// * `Result<BytesMut>` - Frame with sequence number 0
    ///
    /// # Examples
    ///
    /// ```
    /// use minidrone::arsdk::encoder::Command;
    /// use minidrone::arsdk::protocol::FRAME_TYPE_DATA_WITH_ACK;
    ///
    /// let frame = Command::Cap { angle: -90 }.encode(FRAME_TYPE_DATA_WITH_ACK).unwrap();
    /// assert_eq!(&frame[..], &[4, 0, 2, 4, 1, 0, 0xA6, 0xFF]);
    /// ```
    pub fn encode(&self, frame_type: u8) -> Result<BytesMut> {
        let mut w = FrameWriter::new(frame_type, self.id());

        match self {
            Command::SetDate(value) | Command::SetTime(value) => {
                w.put_str(value);
            }
            Command::GetAllSettings
            | Command::GetAllStates
            | Command::TakeOff
            | Command::Land
            | Command::TakePicture => {}
            Command::Pcmd {
                flag,
                roll,
                pitch,
                yaw,
                gaz,
            } => {
                w.put_u8(u8::from(*flag))
                    .put_i8(*roll)
                    .put_i8(*pitch)
                    .put_i8(*yaw)
                    .put_i8(*gaz)
                    .put_u32(0);
            }
            Command::Cap { angle } => {
                w.put_i16(*angle);
            }
            Command::Flip { direction } => {
                w.put_u32(*direction);
            }
            Command::SetMaxTilt(value)
            | Command::SetMaxVerticalSpeed(value)
            | Command::SetMaxRotationSpeed(value) => {
                w.put_f32(*value);
            }
            Command::CutOutMode(value) => {
                w.put_u8(*value);
            }
            Command::HasWheels(value) => {
                w.put_u8(u8::from(*value));
            }
            Command::HasHull(value) => {
                w.put_u32(if *value { 3 } else { 0 });
            }
            Command::UsbLightControl {
                id,
                mode,
                intensity,
            } => {
                w.put_u8(*id).put_u32(*mode).put_u8(*intensity);
            }
            Command::UsbGrabberControl { id, action } | Command::UsbCannonControl { id, action } => {
                w.put_u8(*id).put_u32(*action);
            }
        }

        w.finish()
    }
}
