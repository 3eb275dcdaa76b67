//! # Simulated Drone
//!
//! In-process [`ByteTransport`] that behaves like a minidrone on the other
//! end of the link: it acknowledges commands, answers the connection
//! handshake and reports the state changes a real drone would report for
//! take off, landing, pictures and accessories.
//!
//! Used by the demo binary and the end-to-end tests.

use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

use super::{ByteTransport, Endpoint, LinkEvent, LinkSender};
use crate::arsdk::encoder::FrameWriter;
use crate::arsdk::protocol::*;
use crate::engine::types::{Model, SubModel, ACCESSORY_PRESENT_FLAG};
use crate::error::{MinidroneError, Result};

const PCMD_SIZE: usize = HEADER_SIZE + 9;

/// Raw flying states reported by the simulated drone
mod flying {
    pub const LANDED: u8 = 0;
    pub const TAKING_OFF: u8 = 1;
    pub const HOVERING: u8 = 2;
    pub const LANDING: u8 = 4;
}

#[derive(Debug)]
struct SimState {
    subscriber: Option<LinkSender>,
    linked: bool,

    name: String,
    model: Model,
    sub_model: Option<SubModel>,
    firmware: String,
    battery: u8,
    flying: u8,

    grabber: Option<(u8, u32)>,
    cannon: Option<u8>,
    light: Option<(u8, u32, u8)>,

    ack_seq: u8,
    event_seq: u8,
    event_no_ack_seq: u8,

    written: Vec<(Endpoint, Vec<u8>)>,
}

/// Simulated drone behind an in-memory link
///
/// Cloning shares the simulated device.
#[derive(Debug, Clone)]
pub struct SimulatedDrone {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedDrone {
    /// Create a landed drone with a full battery and no accessory
    pub fn new(name: impl Into<String>, model: Model) -> Self {
        let firmware = match model {
            Model::RollingSpider => "1.99.2",
            Model::Night | Model::Cargo => "2.1.70",
            Model::Mambo => "3.0.26",
        };

        Self {
            state: Arc::new(Mutex::new(SimState {
                subscriber: None,
                linked: false,
                name: name.into(),
                model,
                sub_model: None,
                firmware: firmware.to_string(),
                battery: 100,
                flying: flying::LANDED,
                grabber: None,
                cannon: None,
                light: None,
                ack_seq: 0,
                event_seq: 0,
                event_no_ack_seq: 0,
                written: Vec::new(),
            })),
        }
    }

    pub fn with_battery(self, percent: u8) -> Self {
        self.lock().battery = percent.min(100);
        self
    }

    pub fn with_firmware(self, version: impl Into<String>) -> Self {
        self.lock().firmware = version.into();
        self
    }

    /// Product model reported during the handshake (Night and Cargo only)
    pub fn with_sub_model(self, sub_model: SubModel) -> Self {
        self.lock().sub_model = Some(sub_model);
        self
    }

    /// Plug a closed grabber
    pub fn with_grabber(self, id: u8) -> Self {
        self.lock().grabber = Some((id, 1));
        self
    }

    /// Plug a ready cannon
    pub fn with_cannon(self, id: u8) -> Self {
        self.lock().cannon = Some(id);
        self
    }

    /// Plug a light, switched off
    pub fn with_light(self, id: u8) -> Self {
        self.lock().light = Some((id, 0, 0));
        self
    }

    /// Bring the link up
    pub fn link_up(&self) {
        let mut state = self.lock();
        state.linked = true;
        state.ack_seq = 0;
        state.event_seq = 0;
        state.event_no_ack_seq = 0;

        let event = LinkEvent::Connected {
            name: state.name.clone(),
            model: state.model,
        };
        debug!("Simulated link up ({})", state.name);
        state.deliver(event);
    }

    /// Drop the link
    pub fn link_down(&self) {
        let mut state = self.lock();
        state.linked = false;
        debug!("Simulated link down ({})", state.name);
        state.deliver(LinkEvent::Disconnected);
    }

    /// Change the battery level, reporting it if the link is up
    pub fn set_battery(&self, percent: u8) {
        let mut state = self.lock();
        state.battery = percent.min(100);
        if state.linked {
            state.send_battery();
        }
    }

    /// Raw flying state
    pub fn flying_state(&self) -> u8 {
        self.lock().flying
    }

    /// Every frame written by the controller
    pub fn written(&self) -> Vec<(Endpoint, Vec<u8>)> {
        self.lock().written.clone()
    }

    /// Frames written to one endpoint, in order
    pub fn written_on(&self, endpoint: Endpoint) -> Vec<Vec<u8>> {
        self.lock()
            .written
            .iter()
            .filter(|(ep, _)| *ep == endpoint)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Command frames with the given id, on either command endpoint
    pub fn commands(&self, id: CommandId) -> Vec<Vec<u8>> {
        self.lock()
            .written
            .iter()
            .filter(|(ep, data)| {
                matches!(ep, Endpoint::CommandWithAck | Endpoint::CommandNoAck)
                    && FrameHeader::parse(data).is_some_and(|h| h.id == id)
            })
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Number of piloting commands received
    pub fn pcmd_count(&self) -> usize {
        self.commands(commands::PCMD).len()
    }

    /// `(flag, roll, pitch, yaw, gaz)` of the last piloting command
    pub fn last_pcmd(&self) -> Option<(u8, i8, i8, i8, i8)> {
        self.commands(commands::PCMD)
            .last()
            .filter(|f| f.len() >= PCMD_SIZE)
            .map(|f| (f[6], f[7] as i8, f[8] as i8, f[9] as i8, f[10] as i8))
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ByteTransport for SimulatedDrone {
    fn write(&self, endpoint: Endpoint, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        if !state.linked {
            return Err(MinidroneError::Transport("link is down".to_string()));
        }
        state.written.push((endpoint, data.to_vec()));

        if endpoint == Endpoint::CommandWithAck {
            let header = FrameHeader::parse(data).ok_or_else(|| {
                MinidroneError::Protocol(format!("Truncated command frame {:02X?}", data))
            })?;
            state.acknowledge(&header);
            state.respond(header.id, &data[HEADER_SIZE..]);
        }
        Ok(())
    }

    fn subscribe(&self, receiver: LinkSender) {
        self.lock().subscriber = Some(receiver);
    }
}

impl SimState {
    fn deliver(&self, event: LinkEvent) {
        if let Some(tx) = &self.subscriber {
            let _ = tx.send(event);
        }
    }

    fn acknowledge(&mut self, header: &FrameHeader) {
        self.ack_seq = self.ack_seq.wrapping_add(1);
        let ack = [FRAME_TYPE_ACK, self.ack_seq, header.seq];
        self.deliver(LinkEvent::Data {
            endpoint: Endpoint::CommandAck,
            payload: Bytes::copy_from_slice(&ack),
        });
    }

    /// Push an event frame with the next sequence number of its endpoint
    fn send_event(&mut self, endpoint: Endpoint, writer: FrameWriter) {
        let mut frame = match writer.finish() {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Simulated event dropped: {}", e);
                return;
            }
        };

        let seq = match endpoint {
            Endpoint::EventNoAck => &mut self.event_no_ack_seq,
            _ => &mut self.event_seq,
        };
        *seq = seq.wrapping_add(1);
        frame[SEQ_OFFSET] = *seq;

        trace!("sim <- {:?} {:02X?}", endpoint, &frame[..]);
        self.deliver(LinkEvent::Data {
            endpoint,
            payload: frame.freeze(),
        });
    }

    fn event(id: CommandId) -> FrameWriter {
        FrameWriter::new(FRAME_TYPE_DATA_WITH_ACK, id)
    }

    fn send_flying_state(&mut self, raw: u8) {
        self.flying = raw;
        let mut w = Self::event(events::FLYING_STATE_CHANGED);
        w.put_u8(raw);
        self.send_event(Endpoint::EventWithAck, w);
    }

    fn send_battery(&mut self) {
        let mut w = FrameWriter::new(FRAME_TYPE_DATA, events::BATTERY_STATE_CHANGED);
        w.put_u8(self.battery);
        self.send_event(Endpoint::EventNoAck, w);
    }

    fn send_grabber(&mut self) {
        if let Some((id, raw)) = self.grabber {
            let mut w = Self::event(events::ACCESSORY_GRABBER_STATE);
            w.put_u8(id).put_u32(raw).put_u8(ACCESSORY_PRESENT_FLAG);
            self.send_event(Endpoint::EventWithAck, w);
        }
    }

    fn send_cannon(&mut self, raw: u32) {
        if let Some(id) = self.cannon {
            let mut w = Self::event(events::ACCESSORY_CANNON_STATE);
            w.put_u8(id).put_u32(raw).put_u8(ACCESSORY_PRESENT_FLAG);
            self.send_event(Endpoint::EventWithAck, w);
        }
    }

    fn send_light(&mut self) {
        if let Some((id, mode, intensity)) = self.light {
            let mut w = Self::event(events::ACCESSORY_LIGHT_STATE);
            w.put_u8(id)
                .put_u32(mode)
                .put_u8(intensity)
                .put_u8(ACCESSORY_PRESENT_FLAG);
            self.send_event(Endpoint::EventWithAck, w);
        }
    }

    fn respond(&mut self, id: CommandId, args: &[u8]) {
        match id {
            commands::GET_ALL_SETTINGS => {
                let mut w = Self::event(events::SOFTWARE_VERSION);
                w.put_str(&self.firmware);
                self.send_event(Endpoint::EventWithAck, w);

                if let Some(sub_model) = self.sub_model.filter(|_| self.model.has_sub_model()) {
                    let mut w = Self::event(events::PRODUCT_MODEL);
                    w.put_u8(sub_model as u8);
                    self.send_event(Endpoint::EventWithAck, w);
                }

                self.send_event(
                    Endpoint::EventWithAck,
                    Self::event(events::ALL_SETTINGS_SENT),
                );
            }
            commands::GET_ALL_STATES => {
                self.send_battery();
                self.send_flying_state(self.flying);
                self.send_grabber();
                self.send_cannon(0);
                self.send_light();
                self.send_event(Endpoint::EventWithAck, Self::event(events::ALL_STATE_SENT));
            }
            commands::TAKE_OFF if self.flying == flying::LANDED => {
                self.send_flying_state(flying::TAKING_OFF);
                self.send_flying_state(flying::HOVERING);
            }
            commands::LAND if self.flying != flying::LANDED => {
                self.send_flying_state(flying::LANDING);
                self.send_flying_state(flying::LANDED);
            }
            commands::TAKE_PICTURE => {
                let mut w = Self::event(events::PICTURE_STATE_CHANGED);
                w.put_u8(0);
                self.send_event(Endpoint::EventWithAck, w);
            }
            commands::USB_GRABBER_CONTROL => {
                if let (Some((id, _)), Some(action)) = (self.grabber, read_action(args)) {
                    if args.first() == Some(&id) {
                        self.grabber = Some((id, action));
                        self.send_grabber();
                    }
                }
            }
            commands::USB_CANNON_CONTROL => {
                if self.cannon.is_some() && self.cannon == args.first().copied() {
                    self.send_cannon(1);
                    self.send_cannon(0);
                }
            }
            commands::USB_LIGHT_CONTROL => {
                if let (Some((id, _, _)), Some(mode)) = (self.light, read_action(args)) {
                    let intensity = args.get(5).copied().unwrap_or(0);
                    if args.first() == Some(&id) {
                        self.light = Some((id, mode, intensity));
                        self.send_light();
                    }
                }
            }
            _ => {}
        }
    }
}

/// `u32` argument following the accessory id
fn read_action(args: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = args.get(1..5)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}
