//! # Protocol Engine
//!
//! Owns the logical channels of one drone connection, drives the connection
//! handshake, runs the piloting command loop and turns inbound events into
//! [`Notification`]s.
//!
//! Handshake:
//!
//! ```text
//! Idle --connect()--> Configuring --allSettingsSent--> AwaitingState
//!      --allStateSent--> Running
//! ```
//!
//! `Notification::Connected` is raised once the engine is running *and* the
//! drone reported a flying state other than "not ready", whichever comes
//! last.
//!
//! The engine is not thread safe and does no locking: it is owned by the
//! single worker task (see [`crate::event_loop`]), which feeds it inbound
//! frames and ticks.

pub mod firmware;
pub mod piloting;
pub mod types;

use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::arsdk::channel::{AckSender, InboundChannel, OutboundChannel};
use crate::arsdk::decoder::Event;
use crate::arsdk::encoder::Command;
use crate::arsdk::protocol::FRAME_TYPE_COMMAND;
use crate::config::PilotingConfig;
use crate::transport::{ByteTransport, Endpoint};

use piloting::{PilotingAxes, PilotingCommand};
use types::*;

/// Receiver of engine notifications
pub trait NotificationSink: Send {
    fn notify(&mut self, notification: Notification);
}

impl NotificationSink for mpsc::UnboundedSender<Notification> {
    fn notify(&mut self, notification: Notification) {
        // Receiver gone means the worker is shutting down
        let _ = self.send(notification);
    }
}

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    Configuring,
    AwaitingState,
    Running,
}

/// Device actions the operation controller relies on
///
/// All of them are fire-and-forget: a failed write is logged, never
/// reported, since completion is always observed through notifications.
#[cfg_attr(test, mockall::automock)]
pub trait DroneCommands {
    /// True once the handshake completed
    fn is_running(&self) -> bool;
    fn take_off(&mut self);
    fn land(&mut self);
    /// Set the piloting command, `None` duration for until cleared
    fn pcmd(&mut self, axes: PilotingAxes, duration: Option<Duration>);
    fn clear_pcmd(&mut self);
    /// Relative heading change, in degrees
    fn cap(&mut self, angle: i16);
    fn flip(&mut self, direction: FlipDirection);
    fn take_picture(&mut self);
    fn accessory_cannon_fire(&mut self, id: u8);
    fn accessory_grabber_open(&mut self, id: u8);
    fn accessory_grabber_close(&mut self, id: u8);
    fn accessory_light(&mut self, id: u8, state: LightState);
}

/// Protocol engine of one connection
pub struct ProtocolEngine {
    identity: DeviceIdentity,
    config: PilotingConfig,

    commands: OutboundChannel,
    control: OutboundChannel,
    events: InboundChannel,
    events_no_ack: InboundChannel,

    sink: Box<dyn NotificationSink>,

    handshake: HandshakeState,
    piloting: PilotingCommand,
    battery: BatteryLevel,
    connected: bool,
    initializing: bool,
}

impl ProtocolEngine {
    /// Create an engine bound to `transport`
    ///
    /// # Arguments
    ///
    /// * `transport` - Byte transport of the connected drone
    /// * `name` - Advertised device name
    /// * `model` - Drone family, from discovery data
    /// * `config` - Piloting loop and setup values
    /// * `sink` - Receiver of notifications
    pub fn new(
        transport: Arc<dyn ByteTransport>,
        name: impl Into<String>,
        model: Model,
        config: PilotingConfig,
        sink: Box<dyn NotificationSink>,
    ) -> Self {
        let stop_delay = config.stop_delay_ticks;
        Self {
            identity: DeviceIdentity {
                name: name.into(),
                model,
                sub_model: None,
            },
            config,
            commands: OutboundChannel::new(
                transport.clone(),
                Endpoint::CommandWithAck,
                FRAME_TYPE_COMMAND,
            ),
            control: OutboundChannel::new(
                transport.clone(),
                Endpoint::CommandNoAck,
                FRAME_TYPE_COMMAND,
            ),
            events: InboundChannel::with_ack(
                Endpoint::EventWithAck,
                AckSender::new(transport, Endpoint::EventAck),
            ),
            events_no_ack: InboundChannel::without_ack(Endpoint::EventNoAck),
            sink,
            handshake: HandshakeState::Idle,
            piloting: PilotingCommand::new(stop_delay),
            battery: BatteryLevel::default(),
            connected: false,
            initializing: true,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.handshake
    }

    pub fn battery(&self) -> BatteryLevel {
        self.battery
    }

    /// Start the handshake using the local clock
    pub fn connect(&mut self) {
        self.connect_at(&Local::now());
    }

    /// Start the handshake, stamping the drone clock with `now`
    pub fn connect_at<Tz: TimeZone>(&mut self, now: &DateTime<Tz>)
    where
        Tz::Offset: Display,
    {
        if self.handshake != HandshakeState::Idle {
            debug!("connect() ignored in state {:?}", self.handshake);
            return;
        }

        info!("Connecting to {} ({})", self.identity.name, self.identity.model);
        self.piloting.reset();
        self.battery = BatteryLevel::default();
        self.handshake = HandshakeState::Configuring;

        self.send(Command::set_date(now));
        self.send(Command::set_time(now));
        self.send(Command::GetAllSettings);

        if !self.identity.model.has_sub_model() {
            self.sink.notify(Notification::Connecting(self.identity.clone()));
        }
    }

    /// Process a frame received on `endpoint`
    pub fn handle_frame(&mut self, endpoint: Endpoint, frame: &[u8]) {
        let event = match endpoint {
            Endpoint::EventWithAck => self.events.receive(frame),
            Endpoint::EventNoAck => self.events_no_ack.receive(frame),
            Endpoint::CommandAck => {
                trace!("<- command ack {:02X?}", frame);
                None
            }
            outbound => {
                warn!("Ignoring frame on outbound endpoint {:?}", outbound);
                None
            }
        };

        if let Some(event) = event {
            self.handle_event(event);
        }
    }

    /// Run one piloting loop tick; no-op until the handshake completed
    pub fn tick(&mut self) {
        if self.handshake != HandshakeState::Running {
            return;
        }

        let (command, terminated) = self.piloting.tick();
        if terminated {
            self.sink.notify(Notification::PilotingTerminated);
        }
        if let Err(e) = self.control.send(&command) {
            warn!("Failed to send pcmd: {}", e);
        }
    }

    fn send(&mut self, command: Command) {
        if let Err(e) = self.commands.send(&command) {
            warn!("Failed to send {:?}: {}", command, e);
        }
    }

    fn handle_event(&mut self, event: Event) {
        trace!("<- {:?}", event);

        match event {
            Event::AllSettingsSent => {
                if self.handshake != HandshakeState::Configuring {
                    debug!("allSettingsSent ignored in state {:?}", self.handshake);
                    return;
                }
                self.send(Command::GetAllStates);
                self.handshake = HandshakeState::AwaitingState;
            }
            Event::AllStateSent => {
                if self.handshake != HandshakeState::AwaitingState {
                    debug!("allStateSent ignored in state {:?}", self.handshake);
                    return;
                }
                self.send_setup_commands();
                self.handshake = HandshakeState::Running;
                self.connected = true;
                if !self.initializing {
                    self.notify_connected();
                }
            }
            Event::ProductModel { model } => match SubModel::from_raw(model) {
                Some(sub_model) => {
                    self.identity.sub_model = Some(sub_model);
                    self.sink.notify(Notification::Connecting(self.identity.clone()));
                }
                None => debug!("Unknown product model {}", model),
            },
            Event::FlyingStateChanged { state } => {
                if self.initializing {
                    self.initializing = FlyingState::is_initializing(state);
                    if self.connected && !self.initializing {
                        self.notify_connected();
                    }
                }
                self.sink
                    .notify(Notification::FlyingStateChanged(FlyingState::from_raw(state)));
            }
            Event::AlertStateChanged { alert } => {
                if alert == 3 || alert == 4 {
                    warn!("Low battery alert ({})", alert);
                    self.battery.low = true;
                    self.sink.notify(Notification::BatteryChanged(self.battery));
                }
            }
            Event::BatteryStateChanged { level } => {
                self.battery.percent = Some(level);
                self.sink.notify(Notification::BatteryChanged(self.battery));
            }
            Event::PictureStateChanged { state } => {
                self.sink
                    .notify(Notification::PictureStateChanged { ready: state == 0 });
            }
            Event::SoftwareVersion { version } => {
                if firmware::is_up_to_date(self.identity.model, &version) {
                    debug!("Firmware version {}", version);
                } else {
                    warn!(
                        "Firmware {} is older than the {} minimum {:?}",
                        version,
                        self.identity.model,
                        firmware::min_version(self.identity.model)
                    );
                    self.sink.notify(Notification::FirmwareOutOfDate { version });
                }
            }
            Event::MaxTiltChanged { value, min, max } => {
                debug!("Max tilt {} [{}, {}]", value, min, max);
            }
            Event::MaxVerticalSpeedChanged { value, min, max } => {
                debug!("Max vertical speed {} [{}, {}]", value, min, max);
            }
            Event::MaxRotationSpeedChanged { value, min, max } => {
                debug!("Max rotation speed {} [{}, {}]", value, min, max);
            }
            Event::AccessoryLightState {
                id,
                state,
                intensity,
                list_flags,
            } => {
                let present = list_flags & ACCESSORY_PRESENT_FLAG != 0;
                let state = if present {
                    LightState::from_raw(state, intensity)
                } else {
                    LightState::Off
                };
                self.sink.notify(Notification::Light { present, id, state });
            }
            Event::AccessoryGrabberState {
                id,
                state,
                list_flags,
            } => {
                let present = list_flags & ACCESSORY_PRESENT_FLAG != 0;
                // Closing still counts as opened
                let opened = present && (state == 0 || state == 3);
                self.sink.notify(Notification::Grabber { present, id, opened });
            }
            Event::AccessoryCannonState {
                id,
                state,
                list_flags,
            } => {
                let present = list_flags & ACCESSORY_PRESENT_FLAG != 0;
                let ready = present && state == 0;
                self.sink.notify(Notification::Cannon { present, id, ready });
            }
        }
    }

    fn send_setup_commands(&mut self) {
        if self.identity.model == Model::RollingSpider {
            self.send(Command::HasWheels(true));
        } else {
            self.send(Command::HasHull(true));
        }
        self.send(Command::CutOutMode(u8::from(self.config.cutout_mode)));
        self.send(Command::SetMaxTilt(self.config.max_tilt));
        self.send(Command::SetMaxVerticalSpeed(self.config.max_vertical_speed));
        self.send(Command::SetMaxRotationSpeed(self.config.max_rotation_speed));
    }

    fn notify_connected(&mut self) {
        info!("{} connected", self.identity.name);
        self.sink.notify(Notification::Connected);
    }
}

impl DroneCommands for ProtocolEngine {
    fn is_running(&self) -> bool {
        self.handshake == HandshakeState::Running
    }

    fn take_off(&mut self) {
        self.send(Command::TakeOff);
    }

    fn land(&mut self) {
        self.send(Command::Land);
    }

    fn pcmd(&mut self, axes: PilotingAxes, duration: Option<Duration>) {
        if self.piloting.set(axes, duration, self.config.tick()) {
            self.sink.notify(Notification::PilotingTerminated);
        }
    }

    fn clear_pcmd(&mut self) {
        if self.piloting.clear() {
            self.sink.notify(Notification::PilotingTerminated);
        }
    }

    fn cap(&mut self, angle: i16) {
        self.send(Command::Cap { angle });
    }

    fn flip(&mut self, direction: FlipDirection) {
        self.send(Command::Flip {
            direction: direction as u32,
        });
    }

    fn take_picture(&mut self) {
        self.send(Command::TakePicture);
    }

    fn accessory_cannon_fire(&mut self, id: u8) {
        self.send(Command::UsbCannonControl { id, action: 0 });
    }

    fn accessory_grabber_open(&mut self, id: u8) {
        self.send(Command::UsbGrabberControl { id, action: 0 });
    }

    fn accessory_grabber_close(&mut self, id: u8) {
        self.send(Command::UsbGrabberControl { id, action: 1 });
    }

    fn accessory_light(&mut self, id: u8, state: LightState) {
        let (mode, intensity) = state.control_args();
        self.send(Command::UsbLightControl {
            id,
            mode,
            intensity,
        });
    }
}
