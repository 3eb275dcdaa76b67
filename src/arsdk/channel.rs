//! # Logical Channels
//!
//! Directional pipes bound to one transport endpoint, each with its own
//! 8-bit sequence number stream.
//!
//! - [`OutboundChannel`] stamps a wrapping sequence number on every command
//!   frame it sends (the first frame carries 1).
//! - [`AckSender`] emits `[ACK, localSeq, echoedRemoteSeq]` frames.
//! - [`InboundChannel`] optionally acknowledges every frame it receives, then
//!   decodes it. Unknown frames are dropped silently.

use std::sync::Arc;
use tracing::trace;

use super::decoder::{decode, Event};
use super::encoder::Command;
use super::protocol::*;
use crate::error::Result;
use crate::transport::{ByteTransport, Endpoint};

/// Outbound command channel
pub struct OutboundChannel {
    transport: Arc<dyn ByteTransport>,
    endpoint: Endpoint,
    frame_type: u8,
    seq: u8,
}

impl std::fmt::Debug for OutboundChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundChannel")
            .field("endpoint", &self.endpoint)
            .field("frame_type", &self.frame_type)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl OutboundChannel {
    /// Create a channel writing frames of `frame_type` to `endpoint`
    pub fn new(transport: Arc<dyn ByteTransport>, endpoint: Endpoint, frame_type: u8) -> Self {
        Self {
            transport,
            endpoint,
            frame_type,
            seq: 0,
        }
    }

    /// Send a command
    ///
    /// The sequence number is consumed even when the transport write fails.
    ///
    /// # Returns
    ///
    /// * `Result<u8>` - Sequence number stamped on the frame
    ///
    /// # Errors
    ///
    /// Returns error if the command cannot be encoded or the transport
    /// refuses the write.
    pub fn send(&mut self, command: &Command) -> Result<u8> {
        let mut frame = command.encode(self.frame_type)?;
        self.seq = self.seq.wrapping_add(1);
        frame[SEQ_OFFSET] = self.seq;

        trace!(
            "-> {:?} seq={} id={} ({} bytes)",
            self.endpoint,
            self.seq,
            command.id(),
            frame.len()
        );
        self.transport.write(self.endpoint, &frame)?;
        Ok(self.seq)
    }

    /// Sequence number of the last frame sent (0 before the first)
    pub fn seq(&self) -> u8 {
        self.seq
    }
}

/// Sender of acknowledgment frames, with its own sequence stream
pub struct AckSender {
    transport: Arc<dyn ByteTransport>,
    endpoint: Endpoint,
    seq: u8,
}

impl AckSender {
    pub fn new(transport: Arc<dyn ByteTransport>, endpoint: Endpoint) -> Self {
        Self {
            transport,
            endpoint,
            seq: 0,
        }
    }

    /// Acknowledge a received frame
    pub fn acknowledge(&mut self, received: &[u8]) -> Result<()> {
        self.seq = self.seq.wrapping_add(1);
        let ack = ack_frame(self.seq, received)?;
        trace!("-> {:?} ack seq={} of {}", self.endpoint, ack[1], ack[2]);
        self.transport.write(self.endpoint, &ack)
    }
}

/// Inbound event channel
pub struct InboundChannel {
    endpoint: Endpoint,
    ack: Option<AckSender>,
}

impl InboundChannel {
    /// Channel that acknowledges every frame through `ack`
    pub fn with_ack(endpoint: Endpoint, ack: AckSender) -> Self {
        Self {
            endpoint,
            ack: Some(ack),
        }
    }

    /// Best-effort channel
    pub fn without_ack(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ack: None,
        }
    }

    /// Endpoint this channel listens on
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Process one received frame
    ///
    /// # Returns
    ///
    /// * `Option<Event>` - Decoded event, `None` if the frame is not in the catalog
    pub fn receive(&mut self, frame: &[u8]) -> Option<Event> {
        if let Some(ack) = self.ack.as_mut() {
            if let Err(e) = ack.acknowledge(frame) {
                tracing::warn!("Failed to acknowledge frame on {:?}: {}", self.endpoint, e);
            }
        }

        let event = decode(frame);
        if event.is_none() {
            trace!("<- {:?} dropped frame {:02X?}", self.endpoint, frame);
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MinidroneError;
    use crate::transport::mocks::RecordingTransport;
    use crate::transport::MockByteTransport;

    fn transport() -> (RecordingTransport, Arc<dyn ByteTransport>) {
        let recording = RecordingTransport::new();
        let shared: Arc<dyn ByteTransport> = Arc::new(recording.clone());
        (recording, shared)
    }

    #[test]
    fn test_first_frame_has_seq_one() {
        let (recording, shared) = transport();
        let mut channel =
            OutboundChannel::new(shared, Endpoint::CommandWithAck, FRAME_TYPE_DATA_WITH_ACK);

        assert_eq!(channel.seq(), 0);
        assert_eq!(channel.send(&Command::TakeOff).unwrap(), 1);

        let written = recording.written_on(Endpoint::CommandWithAck);
        assert_eq!(written, vec![vec![4, 1, 2, 0, 1, 0]]);
    }

    #[test]
    fn test_sequence_wraps_after_255() {
        let (recording, shared) = transport();
        let mut channel =
            OutboundChannel::new(shared, Endpoint::CommandNoAck, FRAME_TYPE_COMMAND);

        for _ in 0..300 {
            channel.send(&Command::Land).unwrap();
        }

        let seqs: Vec<u8> = recording
            .written_on(Endpoint::CommandNoAck)
            .iter()
            .map(|f| f[SEQ_OFFSET])
            .collect();
        let expected: Vec<u8> = (1..=300u32).map(|n| (n % 256) as u8).collect();
        assert_eq!(seqs, expected);
        assert_eq!(seqs[254], 255);
        assert_eq!(seqs[255], 0);
        assert_eq!(seqs[256], 1);
    }

    #[test]
    fn test_channels_have_independent_sequences() {
        let (recording, shared) = transport();
        let mut commands =
            OutboundChannel::new(shared.clone(), Endpoint::CommandWithAck, FRAME_TYPE_DATA_WITH_ACK);
        let mut control =
            OutboundChannel::new(shared, Endpoint::CommandNoAck, FRAME_TYPE_COMMAND);

        commands.send(&Command::TakeOff).unwrap();
        commands.send(&Command::Land).unwrap();
        control.send(&Command::TakePicture).unwrap();

        assert_eq!(recording.written_on(Endpoint::CommandWithAck)[1][SEQ_OFFSET], 2);
        assert_eq!(recording.written_on(Endpoint::CommandNoAck)[0][SEQ_OFFSET], 1);
        assert_eq!(recording.written_on(Endpoint::CommandNoAck)[0][0], 4);
    }

    #[test]
    fn test_write_failure_still_consumes_seq() {
        let (recording, shared) = transport();
        let mut channel =
            OutboundChannel::new(shared, Endpoint::CommandWithAck, FRAME_TYPE_DATA_WITH_ACK);

        recording.set_write_error(true);
        assert!(channel.send(&Command::TakeOff).is_err());
        recording.set_write_error(false);
        assert_eq!(channel.send(&Command::TakeOff).unwrap(), 2);
    }

    #[test]
    fn test_inbound_with_ack_acknowledges_every_frame() {
        let (recording, shared) = transport();
        let mut channel = InboundChannel::with_ack(
            Endpoint::EventWithAck,
            AckSender::new(shared, Endpoint::EventAck),
        );

        let remote_seqs = [40u8, 41, 7, 255];
        for seq in remote_seqs {
            // Unknown triple: still acknowledged, but no event
            channel.receive(&[4, seq, 9, 9, 9, 0]);
        }

        let acks = recording.written_on(Endpoint::EventAck);
        assert_eq!(acks.len(), remote_seqs.len());
        for (i, ack) in acks.iter().enumerate() {
            assert_eq!(ack.len(), ACK_FRAME_SIZE);
            assert_eq!(ack[0], FRAME_TYPE_ACK);
            assert_eq!(ack[1], (i + 1) as u8);
            assert_eq!(ack[2], remote_seqs[i]);
        }
    }

    #[test]
    fn test_inbound_decodes_known_events() {
        let (_recording, shared) = transport();
        let mut channel = InboundChannel::with_ack(
            Endpoint::EventWithAck,
            AckSender::new(shared, Endpoint::EventAck),
        );

        let event = channel.receive(&[4, 1, 2, 3, 1, 0, 2]);
        assert_eq!(event, Some(Event::FlyingStateChanged { state: 2 }));
    }

    #[test]
    fn test_inbound_without_ack_sends_nothing() {
        let mut channel = InboundChannel::without_ack(Endpoint::EventNoAck);
        assert_eq!(channel.endpoint(), Endpoint::EventNoAck);

        let event = channel.receive(&[2, 1, 0, 5, 1, 0, 55]);
        assert_eq!(event, Some(Event::BatteryStateChanged { level: 55 }));
    }

    #[test]
    fn test_failed_ack_still_delivers_event() {
        let mut mock = MockByteTransport::new();
        mock.expect_write()
            .withf(|endpoint, data| *endpoint == Endpoint::EventAck && data == [1, 1, 9])
            .times(1)
            .returning(|_, _| Err(MinidroneError::Transport("link is down".to_string())));

        let mut channel = InboundChannel::with_ack(
            Endpoint::EventWithAck,
            AckSender::new(Arc::new(mock), Endpoint::EventAck),
        );

        let event = channel.receive(&[4, 9, 2, 7, 1, 0, 0]);
        assert_eq!(event, Some(Event::PictureStateChanged { state: 0 }));
    }
}
