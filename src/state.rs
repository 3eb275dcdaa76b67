//! Caller-visible drone state, published on watch channels by the worker.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::controller::Operation;
use crate::engine::types::{BatteryLevel, DeviceIdentity, FlyingState, Notification};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Link is up, handshake in progress
    Connecting,
    Connected,
}

/// Snapshot of everything known about the drone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DroneState {
    pub connection: ConnectionState,
    pub identity: Option<DeviceIdentity>,
    pub flying_state: FlyingState,
    pub battery: BatteryLevel,
    pub has_cannon: bool,
    pub has_grabber: bool,
    pub firmware_out_of_date: bool,
    /// An operation is in flight
    pub busy: bool,
}

impl DroneState {
    /// Fold an engine notification into the snapshot
    ///
    /// # Returns
    ///
    /// * `bool` - True if the snapshot changed
    pub fn apply(&mut self, notification: &Notification) -> bool {
        let before = self.clone();

        match notification {
            Notification::Connecting(identity) => self.identity = Some(identity.clone()),
            Notification::Connected => self.connection = ConnectionState::Connected,
            Notification::FirmwareOutOfDate { .. } => self.firmware_out_of_date = true,
            Notification::FlyingStateChanged(state) => self.flying_state = *state,
            Notification::BatteryChanged(battery) => self.battery = *battery,
            Notification::Grabber { present, .. } => self.has_grabber = *present,
            Notification::Cannon { present, .. } => self.has_cannon = *present,
            Notification::PilotingTerminated
            | Notification::PictureStateChanged { .. }
            | Notification::Light { .. } => {}
        }

        *self != before
    }
}

pub(crate) struct StateWriters {
    pub drone_state: watch::Sender<DroneState>,
    pub operation: watch::Sender<Option<Operation>>,
}

#[derive(Clone)]
pub(crate) struct StateChannels {
    pub drone_state: watch::Receiver<DroneState>,
    pub operation: watch::Receiver<Option<Operation>>,
}

pub(crate) fn create_channels() -> (StateWriters, StateChannels) {
    let (state_tx, state_rx) = watch::channel(DroneState::default());
    let (op_tx, op_rx) = watch::channel(None);

    let writers = StateWriters {
        drone_state: state_tx,
        operation: op_tx,
    };

    let channels = StateChannels {
        drone_state: state_rx,
        operation: op_rx,
    };

    (writers, channels)
}
