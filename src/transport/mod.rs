//! # Byte Transport Module
//!
//! Abstract byte-channel provider the protocol runs on top of.
//!
//! The physical radio (BLE discovery, connection, characteristic
//! write/notify) lives outside this crate. A transport only has to:
//! - write raw frames to one of the three outbound endpoints
//! - push link lifecycle changes and inbound frames into the [`LinkSender`]
//!   handed to [`ByteTransport::subscribe`]
//!
//! Inbound delivery may happen on any thread; the receiving side of the
//! channel is drained by the protocol's single worker task.

pub mod sim;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::engine::types::Model;
use crate::error::Result;

/// Logical endpoints of the link, seen from the controller side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Commands without ack (piloting commands)
    CommandNoAck,
    /// Commands the drone acknowledges
    CommandWithAck,
    /// Acks of received events
    EventAck,
    /// Best-effort events
    EventNoAck,
    /// Events that must be acknowledged
    EventWithAck,
    /// Acks of sent commands
    CommandAck,
}

/// Link lifecycle and inbound traffic, as reported by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// All endpoints are available
    Connected { name: String, model: Model },
    /// A frame arrived on an inbound endpoint
    Data { endpoint: Endpoint, payload: Bytes },
    /// The link went down
    Disconnected,
}

/// Sending half handed to transports
pub type LinkSender = mpsc::UnboundedSender<LinkEvent>;

/// Receiving half drained by the worker
pub type LinkReceiver = mpsc::UnboundedReceiver<LinkEvent>;

/// Trait for the byte transport the protocol is bound to
#[cfg_attr(test, mockall::automock)]
pub trait ByteTransport: Send + Sync {
    /// Write one frame to an outbound endpoint
    ///
    /// Fire-and-forget: no retry and no backpressure at this layer.
    fn write(&self, endpoint: Endpoint, data: &[u8]) -> Result<()>;

    /// Register the receiver of link events and inbound frames
    fn subscribe(&self, receiver: LinkSender);
}
