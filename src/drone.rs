//! # Drone Handle
//!
//! Caller-facing API. Every call hands off to the worker task and waits for
//! the terminal result of the operation it started, so from the caller's
//! side each call is synchronous.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use minidrone::config::Config;
//! use minidrone::controller::MoveDirection;
//! use minidrone::drone::Drone;
//! use minidrone::engine::types::Model;
//! use minidrone::transport::sim::SimulatedDrone;
//!
//! # async fn run() -> minidrone::error::Result<()> {
//! let sim = Arc::new(SimulatedDrone::new("Mambo_612345", Model::Mambo));
//! let drone = Drone::start(sim.clone(), Config::default());
//! sim.link_up();
//!
//! drone.wait_connected().await?;
//! drone.take_off().await?;
//! drone.move_toward(MoveDirection::Forward, Duration::from_secs(1)).await?;
//! drone.land().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::controller::{MoveDirection, MoveParams, Operation, TurnDirection};
use crate::engine::types::{FlipDirection, FlyingState, LightState};
use crate::error::{MinidroneError, Result};
use crate::event_loop::run_event_loop;
use crate::request::Request;
use crate::state::{create_channels, ConnectionState, DroneState, StateChannels};
use crate::transport::ByteTransport;

/// Handle to one drone
///
/// `Drone` is `Clone + Send + Sync`. Clones share the same worker; when the
/// last clone is dropped the worker is cancelled.
#[derive(Clone)]
pub struct Drone {
    inner: Arc<DroneInner>,
}

struct DroneInner {
    request_tx: mpsc::Sender<Request>,
    cancel: CancellationToken,
    channels: StateChannels,
    speed: AtomicU8,
    config: Config,
}

impl Drop for DroneInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Drone {
    /// Spawn the worker bound to `transport`
    ///
    /// Must be called from within a tokio runtime. The drone becomes usable
    /// once the transport reports the link up and the handshake completed;
    /// see [`Drone::wait_connected`].
    pub fn start(transport: Arc<dyn ByteTransport>, config: Config) -> Self {
        let (writers, channels) = create_channels();
        let cancel = CancellationToken::new();
        let (request_tx, request_rx) = mpsc::channel(config.link.command_buffer_size);
        let (link_tx, link_rx) = mpsc::unbounded_channel();

        transport.subscribe(link_tx);

        tokio::spawn(run_event_loop(
            transport,
            link_rx,
            request_rx,
            writers,
            config.clone(),
            cancel.clone(),
        ));

        Drone {
            inner: Arc::new(DroneInner {
                request_tx,
                cancel,
                channels,
                speed: AtomicU8::new(config.operations.default_speed),
                config,
            }),
        }
    }

    // --- Reactive state (watch channels) ---

    pub fn state(&self) -> watch::Receiver<DroneState> {
        self.inner.channels.drone_state.clone()
    }

    /// Operation in flight, `None` when idle
    pub fn operation(&self) -> watch::Receiver<Option<Operation>> {
        self.inner.channels.operation.clone()
    }

    /// Current state snapshot
    pub fn snapshot(&self) -> DroneState {
        self.inner.channels.drone_state.borrow().clone()
    }

    /// Wait until the handshake completed
    ///
    /// # Errors
    ///
    /// * `Timeout` - not connected within `link.connect_timeout_ms`
    /// * `Disconnected` - the worker stopped
    pub async fn wait_connected(&self) -> Result<()> {
        let mut rx = self.state();
        let wait = async {
            loop {
                if rx.borrow_and_update().connection == ConnectionState::Connected {
                    return Ok(());
                }
                rx.changed()
                    .await
                    .map_err(|_| MinidroneError::Disconnected)?;
            }
        };

        tokio::time::timeout(self.inner.config.link.connect_timeout(), wait)
            .await
            .map_err(|_| MinidroneError::Timeout)?
    }

    // --- Speed ---

    /// Speed of directional moves, in percent
    pub fn speed(&self) -> u8 {
        self.inner.speed.load(Ordering::Relaxed)
    }

    /// Set the speed of directional moves, clamped to 100 %
    pub fn set_speed(&self, percent: u8) {
        self.inner.speed.store(percent.min(100), Ordering::Relaxed);
    }

    // --- Operations ---

    /// Take off and hover; does nothing unless landed
    pub async fn take_off(&self) -> Result<()> {
        if self.snapshot().flying_state != FlyingState::Landed {
            return Ok(());
        }
        self.execute(Operation::TakeOff).await
    }

    /// Land; does nothing unless flying
    pub async fn land(&self) -> Result<()> {
        if !self.is_flying() {
            return Ok(());
        }
        self.execute(Operation::Land).await
    }

    /// Move in one direction at the current speed for `duration`
    pub async fn move_toward(&self, direction: MoveDirection, duration: Duration) -> Result<()> {
        let params = MoveParams::from_direction(direction, self.speed());
        self.move_with(params, Some(duration)).await
    }

    /// Start moving in one direction and return right away
    pub async fn start_moving(&self, direction: MoveDirection) -> Result<()> {
        let params = MoveParams::from_direction(direction, self.speed());
        self.move_with(params, None).await
    }

    /// Move on several axes, for `duration` or until stopped
    pub async fn move_with(&self, params: MoveParams, duration: Option<Duration>) -> Result<()> {
        self.execute(Operation::Move { params, duration }).await
    }

    /// Stop the current movement
    pub async fn stop_moving(&self) -> Result<()> {
        self.execute(Operation::StopMove).await
    }

    /// Turn on the spot by `angle` degrees; does nothing unless flying
    pub async fn turn(&self, direction: TurnDirection, angle: u32) -> Result<()> {
        if !self.is_flying() {
            return Ok(());
        }
        let angle = direction.signed_angle(angle);
        self.execute(Operation::Turn { angle }).await
    }

    /// Flip; does nothing unless flying
    ///
    /// # Errors
    ///
    /// * `LowBattery` - battery below `operations.flip_min_battery`
    pub async fn flip(&self, direction: FlipDirection) -> Result<()> {
        if !self.is_flying() {
            return Ok(());
        }
        self.execute(Operation::Flip { direction }).await
    }

    pub async fn take_picture(&self) -> Result<()> {
        self.execute(Operation::TakePicture).await
    }

    /// # Errors
    ///
    /// * `AccessoryMissing` - no cannon attached
    pub async fn fire_cannon(&self) -> Result<()> {
        self.execute(Operation::FireAccessory).await
    }

    /// # Errors
    ///
    /// * `AccessoryMissing` - no grabber attached
    pub async fn open_grabber(&self) -> Result<()> {
        self.execute(Operation::OpenAccessory).await
    }

    /// # Errors
    ///
    /// * `AccessoryMissing` - no grabber attached
    pub async fn close_grabber(&self) -> Result<()> {
        self.execute(Operation::CloseAccessory).await
    }

    /// Set the light accessory; returns once the command is written
    pub async fn set_light(&self, state: LightState) -> Result<()> {
        self.send_request(|reply| Request::SetLight { state, reply })
            .await
    }

    /// Run an operation and wait for its terminal result
    ///
    /// # Errors
    ///
    /// * `Busy` - another operation is in flight
    /// * `NotConnected` - handshake not completed
    /// * `Disconnected` - the link dropped while the operation was in flight
    /// * `LowBattery`, `AccessoryMissing` - operation preconditions
    pub async fn execute(&self, operation: Operation) -> Result<()> {
        self.send_request(|reply| Request::Execute { operation, reply })
            .await
    }

    /// Stop the worker
    pub async fn disconnect(self) -> Result<()> {
        let _ = self.inner.request_tx.send(Request::Shutdown).await;
        Ok(())
    }

    fn is_flying(&self) -> bool {
        self.snapshot().flying_state == FlyingState::Flying
    }

    async fn send_request(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<()>>) -> Request,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .request_tx
            .send(make(tx))
            .await
            .map_err(|_| MinidroneError::Disconnected)?;
        rx.await.map_err(|_| MinidroneError::Disconnected)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mocks::RecordingTransport;

    #[tokio::test]
    async fn test_speed_is_clamped() {
        let drone = Drone::start(Arc::new(RecordingTransport::new()), Config::default());
        assert_eq!(drone.speed(), 50);

        drone.set_speed(80);
        assert_eq!(drone.speed(), 80);

        drone.set_speed(250);
        assert_eq!(drone.speed(), 100);
    }

    #[tokio::test]
    async fn test_operations_before_link_up_are_rejected() {
        let drone = Drone::start(Arc::new(RecordingTransport::new()), Config::default());

        assert!(matches!(
            drone.take_picture().await,
            Err(MinidroneError::NotConnected)
        ));
        assert!(matches!(
            drone.set_light(LightState::Blink).await,
            Err(MinidroneError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_flying_only_operations_are_skipped_when_landed() {
        let transport = RecordingTransport::new();
        let drone = Drone::start(Arc::new(transport.clone()), Config::default());

        tokio_test::assert_ok!(drone.land().await);
        tokio_test::assert_ok!(drone.turn(TurnDirection::Left, 90).await);
        tokio_test::assert_ok!(drone.flip(FlipDirection::Front).await);
        assert!(transport.get_written_data().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_connected_times_out() {
        let drone = Drone::start(Arc::new(RecordingTransport::new()), Config::default());
        assert!(matches!(
            drone.wait_connected().await,
            Err(MinidroneError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_requests_after_disconnect_fail() {
        let drone = Drone::start(Arc::new(RecordingTransport::new()), Config::default());
        let other = drone.clone();
        drone.disconnect().await.unwrap();

        assert!(matches!(
            other.take_picture().await,
            Err(MinidroneError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_link_events_reach_the_worker() {
        let transport = RecordingTransport::new();
        let drone = Drone::start(Arc::new(transport.clone()), Config::default());
        let mut state = drone.state();

        transport.deliver(crate::transport::LinkEvent::Connected {
            name: "Mambo_1".to_string(),
            model: crate::engine::types::Model::Mambo,
        });

        state.changed().await.unwrap();
        assert_eq!(state.borrow().connection, ConnectionState::Connecting);
    }
}
