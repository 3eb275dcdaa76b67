//! # Operation Controller
//!
//! Runs one high-level [`Operation`] at a time on top of the protocol engine
//! and resolves it to exactly one terminal result.
//!
//! Each operation issues its device action, then completes on:
//! - a notification (flying state, piloting terminated, accessory state,
//!   picture ready), or
//! - a fixed-delay timer where the drone reports nothing (turn, flip, and the
//!   settle delay after take off and landing)
//!
//! Timers are tagged with the generation of the operation that armed them;
//! a timer that outlives its operation is ignored.
//!
//! A disconnection drops the pending reply without sending a result.

pub mod operation;

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::OperationsConfig;
use crate::engine::types::{Accessory, BatteryLevel, FlyingState, Notification};
use crate::engine::DroneCommands;
use crate::error::{MinidroneError, Result};

pub use operation::{MoveDirection, MoveParams, Operation, TurnDirection, TURN_RANGE};

/// Reply slot of an operation
pub type Reply = oneshot::Sender<Result<()>>;

#[derive(Debug)]
struct InFlight {
    operation: Operation,
    generation: u64,
    reply: Reply,
    timer_armed: bool,
}

/// Operation state machine
#[derive(Debug)]
pub struct OperationController {
    config: OperationsConfig,
    timer_tx: mpsc::UnboundedSender<u64>,
    current: Option<InFlight>,
    generation: u64,

    battery: BatteryLevel,
    flying_state: FlyingState,
    grabber_id: Option<u8>,
    cannon_id: Option<u8>,
}

impl OperationController {
    /// Create a controller
    ///
    /// # Arguments
    ///
    /// * `config` - Completion delays and flip battery floor
    /// * `timer_tx` - Where expired timers post their generation
    pub fn new(config: OperationsConfig, timer_tx: mpsc::UnboundedSender<u64>) -> Self {
        Self {
            config,
            timer_tx,
            current: None,
            generation: 0,
            battery: BatteryLevel::default(),
            flying_state: FlyingState::default(),
            grabber_id: None,
            cannon_id: None,
        }
    }

    /// Operation in flight, if any
    pub fn current_operation(&self) -> Option<&Operation> {
        self.current.as_ref().map(|c| &c.operation)
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    pub fn flying_state(&self) -> FlyingState {
        self.flying_state
    }

    pub fn has_grabber(&self) -> bool {
        self.grabber_id.is_some()
    }

    pub fn has_cannon(&self) -> bool {
        self.cannon_id.is_some()
    }

    /// Start an operation
    ///
    /// The result is sent on `reply` exactly once: right away when a
    /// precondition fails, otherwise when the completion trigger fires.
    ///
    /// # Arguments
    ///
    /// * `operation` - Operation to run
    /// * `reply` - Receiver of the terminal result
    /// * `engine` - Protocol engine, `None` while the link is down
    pub fn execute(
        &mut self,
        operation: Operation,
        reply: Reply,
        engine: Option<&mut dyn DroneCommands>,
    ) {
        if let Some(current) = &self.current {
            warn!(
                "Rejecting {:?}: {:?} still in flight",
                operation, current.operation
            );
            let _ = reply.send(Err(MinidroneError::Busy));
            return;
        }

        let engine = match engine {
            Some(engine) if engine.is_running() => engine,
            _ => {
                debug!("Rejecting {:?}: not connected", operation);
                let _ = reply.send(Err(MinidroneError::NotConnected));
                return;
            }
        };

        if let Err(e) = self.dispatch(&operation, engine) {
            debug!("{:?} failed: {}", operation, e);
            let _ = reply.send(Err(e));
            return;
        }

        self.generation += 1;
        debug!("Started {:?} (#{})", operation, self.generation);
        let timer = match operation {
            Operation::Turn { .. } => Some(self.config.turn_delay_ms),
            Operation::Flip { .. } => Some(self.config.flip_delay_ms),
            _ => None,
        };
        self.current = Some(InFlight {
            operation,
            generation: self.generation,
            reply,
            timer_armed: false,
        });
        if let Some(delay_ms) = timer {
            self.arm_timer(delay_ms);
        }
    }

    /// Issue the device action of `operation`, checking its preconditions
    fn dispatch(&self, operation: &Operation, engine: &mut dyn DroneCommands) -> Result<()> {
        match operation {
            Operation::TakeOff => engine.take_off(),
            Operation::Land => engine.land(),
            Operation::Move { params, duration } => engine.pcmd(params.axes(), *duration),
            Operation::StopMove => engine.clear_pcmd(),
            Operation::Turn { angle } => {
                let angle = (*angle).clamp(*TURN_RANGE.start(), *TURN_RANGE.end());
                engine.cap(angle as i16);
            }
            Operation::Flip { direction } => match self.battery.percent {
                Some(percent) if percent >= self.config.flip_min_battery => {
                    engine.flip(*direction)
                }
                _ => return Err(MinidroneError::LowBattery),
            },
            Operation::FireAccessory => {
                let id = self
                    .cannon_id
                    .ok_or(MinidroneError::AccessoryMissing(Accessory::Cannon))?;
                engine.accessory_cannon_fire(id);
            }
            Operation::OpenAccessory => {
                let id = self
                    .grabber_id
                    .ok_or(MinidroneError::AccessoryMissing(Accessory::Grabber))?;
                engine.accessory_grabber_open(id);
            }
            Operation::CloseAccessory => {
                let id = self
                    .grabber_id
                    .ok_or(MinidroneError::AccessoryMissing(Accessory::Grabber))?;
                engine.accessory_grabber_close(id);
            }
            Operation::TakePicture => engine.take_picture(),
        }
        Ok(())
    }

    /// Feed an engine notification
    pub fn on_notification(&mut self, notification: &Notification) {
        match notification {
            Notification::FlyingStateChanged(state) => {
                self.flying_state = *state;
                let settled = match self.current_operation() {
                    Some(Operation::TakeOff) => *state == FlyingState::Flying,
                    Some(Operation::Land) => *state == FlyingState::Landed,
                    _ => false,
                };
                if settled {
                    self.arm_timer(self.config.settle_delay_ms);
                }
            }
            Notification::PilotingTerminated => {
                if matches!(
                    self.current_operation(),
                    Some(Operation::Move { .. } | Operation::StopMove)
                ) {
                    self.finish(Ok(()));
                }
            }
            Notification::BatteryChanged(battery) => {
                self.battery = *battery;
            }
            Notification::PictureStateChanged { ready } => {
                if *ready && matches!(self.current_operation(), Some(Operation::TakePicture)) {
                    self.finish(Ok(()));
                }
            }
            Notification::Grabber { present, id, opened } => {
                if !*present {
                    self.forget(Accessory::Grabber);
                } else if self.grabber_id.is_none() {
                    debug!("Grabber attached with id {}", id);
                    self.grabber_id = Some(*id);
                } else {
                    let done = match self.current_operation() {
                        Some(Operation::OpenAccessory) => *opened,
                        Some(Operation::CloseAccessory) => !*opened,
                        _ => false,
                    };
                    if done {
                        self.finish(Ok(()));
                    }
                }
            }
            Notification::Cannon { present, id, ready } => {
                if !*present {
                    self.forget(Accessory::Cannon);
                } else if self.cannon_id.is_none() {
                    debug!("Cannon attached with id {}", id);
                    self.cannon_id = Some(*id);
                } else if *ready && matches!(self.current_operation(), Some(Operation::FireAccessory)) {
                    self.finish(Ok(()));
                }
            }
            Notification::Connecting(_)
            | Notification::Connected
            | Notification::FirmwareOutOfDate { .. }
            | Notification::Light { .. } => {}
        }
    }

    /// Feed an expired timer
    pub fn on_timer(&mut self, generation: u64) {
        match &self.current {
            Some(current) if current.generation == generation => self.finish(Ok(())),
            _ => debug!("Ignoring stale timer #{}", generation),
        }
    }

    /// Link lost: abort the operation in flight and reset derived state
    pub fn on_disconnect(&mut self) {
        if let Some(current) = self.current.take() {
            debug!("Aborting {:?} on disconnect", current.operation);
        }
        self.battery = BatteryLevel::default();
        self.flying_state = FlyingState::default();
        self.grabber_id = None;
        self.cannon_id = None;
    }

    fn forget(&mut self, accessory: Accessory) {
        match accessory {
            Accessory::Grabber => self.grabber_id = None,
            Accessory::Cannon => self.cannon_id = None,
            Accessory::Light => {}
        }

        let targeted = self
            .current_operation()
            .and_then(Operation::accessory)
            .is_some_and(|a| a == accessory);
        if targeted {
            self.finish(Err(MinidroneError::AccessoryMissing(accessory)));
        }
    }

    fn arm_timer(&mut self, delay_ms: u64) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        if current.timer_armed {
            return;
        }
        current.timer_armed = true;

        let generation = current.generation;
        let tx = self.timer_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let _ = tx.send(generation);
        });
    }

    fn finish(&mut self, result: Result<()>) {
        if let Some(current) = self.current.take() {
            debug!("{:?} finished: {:?}", current.operation, result);
            // Caller may have given up waiting
            let _ = current.reply.send(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::FlipDirection;
    use crate::engine::MockDroneCommands;
    use mockall::predicate::eq;
    use tokio::time::Instant;

    struct Harness {
        controller: OperationController,
        timers: mpsc::UnboundedReceiver<u64>,
    }

    impl Harness {
        fn new() -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                controller: OperationController::new(OperationsConfig::default(), tx),
                timers: rx,
            }
        }

        fn start(
            &mut self,
            operation: Operation,
            engine: &mut MockDroneCommands,
        ) -> oneshot::Receiver<Result<()>> {
            let (tx, rx) = oneshot::channel();
            self.controller
                .execute(operation, tx, Some(engine as &mut dyn DroneCommands));
            rx
        }

        /// Wait for the next timer and feed it back
        async fn fire_next_timer(&mut self) {
            let generation = self.timers.recv().await.unwrap();
            self.controller.on_timer(generation);
        }
    }

    fn running_engine() -> MockDroneCommands {
        let mut engine = MockDroneCommands::new();
        engine.expect_is_running().return_const(true);
        engine
    }

    fn battery(percent: u8) -> Notification {
        Notification::BatteryChanged(BatteryLevel {
            percent: Some(percent),
            low: false,
        })
    }

    fn grabber(opened: bool) -> Notification {
        Notification::Grabber {
            present: true,
            id: 3,
            opened,
        }
    }

    #[tokio::test]
    async fn test_rejected_when_not_connected() {
        let mut h = Harness::new();

        let (tx, mut rx) = oneshot::channel();
        h.controller.execute(Operation::TakeOff, tx, None);
        assert!(matches!(rx.try_recv(), Ok(Err(MinidroneError::NotConnected))));

        let mut engine = MockDroneCommands::new();
        engine.expect_is_running().return_const(false);
        engine.expect_take_off().times(0);
        let mut rx = h.start(Operation::TakeOff, &mut engine);
        assert!(matches!(rx.try_recv(), Ok(Err(MinidroneError::NotConnected))));
        assert!(!h.controller.is_busy());
    }

    #[tokio::test]
    async fn test_overlapping_operation_is_rejected() {
        let mut h = Harness::new();
        let mut engine = running_engine();
        engine.expect_take_off().times(1).return_const(());
        engine.expect_land().times(0);

        let mut first = h.start(Operation::TakeOff, &mut engine);
        let mut second = h.start(Operation::Land, &mut engine);

        assert!(matches!(second.try_recv(), Ok(Err(MinidroneError::Busy))));
        assert!(first.try_recv().is_err());
        assert_eq!(h.controller.current_operation(), Some(&Operation::TakeOff));
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_off_completes_after_settle_delay() {
        let mut h = Harness::new();
        let mut engine = running_engine();
        engine.expect_take_off().times(1).return_const(());

        let mut rx = h.start(Operation::TakeOff, &mut engine);
        h.controller
            .on_notification(&Notification::FlyingStateChanged(FlyingState::TakingOff));
        let armed = Instant::now();
        h.controller
            .on_notification(&Notification::FlyingStateChanged(FlyingState::Flying));
        h.controller
            .on_notification(&Notification::FlyingStateChanged(FlyingState::Flying));
        assert!(rx.try_recv().is_err());

        h.fire_next_timer().await;
        assert!(armed.elapsed() >= Duration::from_millis(1000));
        assert!(matches!(rx.try_recv(), Ok(Ok(()))));
        assert!(!h.controller.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_land_completes_after_landed() {
        let mut h = Harness::new();
        let mut engine = running_engine();
        engine.expect_land().times(1).return_const(());

        let mut rx = h.start(Operation::Land, &mut engine);
        h.controller
            .on_notification(&Notification::FlyingStateChanged(FlyingState::Landing));
        h.controller
            .on_notification(&Notification::FlyingStateChanged(FlyingState::Landed));
        h.fire_next_timer().await;

        assert!(matches!(rx.try_recv(), Ok(Ok(()))));
        assert_eq!(h.controller.flying_state(), FlyingState::Landed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_clamps_angle_and_completes_after_delay() {
        let mut h = Harness::new();
        let mut engine = running_engine();
        engine.expect_cap().with(eq(180i16)).times(1).return_const(());

        let start = Instant::now();
        let mut rx = h.start(Operation::Turn { angle: 400 }, &mut engine);
        h.fire_next_timer().await;

        assert!(start.elapsed() >= Duration::from_millis(2000));
        assert!(matches!(rx.try_recv(), Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_flip_below_battery_floor_fails_without_write() {
        let mut h = Harness::new();
        let mut engine = running_engine();
        engine.expect_flip().times(0);

        h.controller.on_notification(&battery(9));
        let mut rx = h.start(
            Operation::Flip {
                direction: FlipDirection::Front,
            },
            &mut engine,
        );

        assert!(matches!(rx.try_recv(), Ok(Err(MinidroneError::LowBattery))));
        assert!(!h.controller.is_busy());
    }

    #[tokio::test]
    async fn test_flip_with_unknown_battery_fails() {
        let mut h = Harness::new();
        let mut engine = running_engine();
        engine.expect_flip().times(0);

        let mut rx = h.start(
            Operation::Flip {
                direction: FlipDirection::Back,
            },
            &mut engine,
        );
        assert!(matches!(rx.try_recv(), Ok(Err(MinidroneError::LowBattery))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flip_at_battery_floor_completes_after_delay() {
        let mut h = Harness::new();
        let mut engine = running_engine();
        engine
            .expect_flip()
            .with(eq(FlipDirection::Right))
            .times(1)
            .return_const(());

        h.controller.on_notification(&battery(10));
        let start = Instant::now();
        let mut rx = h.start(
            Operation::Flip {
                direction: FlipDirection::Right,
            },
            &mut engine,
        );
        assert!(rx.try_recv().is_err());

        h.fire_next_timer().await;
        assert!(start.elapsed() >= Duration::from_millis(3000));
        assert!(matches!(rx.try_recv(), Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_move_completes_on_piloting_terminated() {
        let mut h = Harness::new();
        let mut engine = running_engine();
        let params = MoveParams {
            longitudinal_speed: 120,
            ..Default::default()
        };
        engine
            .expect_pcmd()
            .withf(|axes, duration| axes.pitch == 100 && *duration == Some(Duration::from_secs(2)))
            .times(1)
            .return_const(());

        let mut rx = h.start(
            Operation::Move {
                params,
                duration: Some(Duration::from_secs(2)),
            },
            &mut engine,
        );
        h.controller
            .on_notification(&Notification::PictureStateChanged { ready: true });
        assert!(rx.try_recv().is_err());

        h.controller.on_notification(&Notification::PilotingTerminated);
        assert!(matches!(rx.try_recv(), Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_stop_move_clears_piloting() {
        let mut h = Harness::new();
        let mut engine = running_engine();
        engine.expect_clear_pcmd().times(1).return_const(());

        let mut rx = h.start(Operation::StopMove, &mut engine);
        h.controller.on_notification(&Notification::PilotingTerminated);
        assert!(matches!(rx.try_recv(), Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_grabber_ops_require_known_accessory() {
        let mut h = Harness::new();
        let mut engine = running_engine();
        engine.expect_accessory_grabber_open().times(0);

        let mut rx = h.start(Operation::OpenAccessory, &mut engine);
        assert!(matches!(
            rx.try_recv(),
            Ok(Err(MinidroneError::AccessoryMissing(Accessory::Grabber)))
        ));
    }

    #[tokio::test]
    async fn test_open_grabber_completes_when_opened() {
        let mut h = Harness::new();
        let mut engine = running_engine();
        engine
            .expect_accessory_grabber_open()
            .with(eq(3u8))
            .times(1)
            .return_const(());

        h.controller.on_notification(&grabber(false));
        assert!(h.controller.has_grabber());

        let mut rx = h.start(Operation::OpenAccessory, &mut engine);
        h.controller.on_notification(&grabber(false));
        assert!(rx.try_recv().is_err());

        h.controller.on_notification(&grabber(true));
        assert!(matches!(rx.try_recv(), Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_close_grabber_completes_when_closed() {
        let mut h = Harness::new();
        let mut engine = running_engine();
        engine
            .expect_accessory_grabber_close()
            .with(eq(3u8))
            .times(1)
            .return_const(());

        h.controller.on_notification(&grabber(true));
        let mut rx = h.start(Operation::CloseAccessory, &mut engine);
        h.controller.on_notification(&grabber(false));
        assert!(matches!(rx.try_recv(), Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_fire_cannon_completes_when_ready() {
        let mut h = Harness::new();
        let mut engine = running_engine();
        engine
            .expect_accessory_cannon_fire()
            .with(eq(5u8))
            .times(1)
            .return_const(());

        let cannon = |ready| Notification::Cannon {
            present: true,
            id: 5,
            ready,
        };
        h.controller.on_notification(&cannon(true));
        let mut rx = h.start(Operation::FireAccessory, &mut engine);
        h.controller.on_notification(&cannon(false));
        assert!(rx.try_recv().is_err());
        h.controller.on_notification(&cannon(true));
        assert!(matches!(rx.try_recv(), Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_accessory_removed_mid_operation() {
        let mut h = Harness::new();
        let mut engine = running_engine();
        engine.expect_accessory_grabber_open().return_const(());

        h.controller.on_notification(&grabber(false));
        let mut rx = h.start(Operation::OpenAccessory, &mut engine);
        h.controller.on_notification(&Notification::Grabber {
            present: false,
            id: 3,
            opened: false,
        });

        assert!(matches!(
            rx.try_recv(),
            Ok(Err(MinidroneError::AccessoryMissing(Accessory::Grabber)))
        ));
        assert!(!h.controller.has_grabber());
    }

    #[tokio::test]
    async fn test_take_picture_completes_when_ready() {
        let mut h = Harness::new();
        let mut engine = running_engine();
        engine.expect_take_picture().times(1).return_const(());

        let mut rx = h.start(Operation::TakePicture, &mut engine);
        h.controller
            .on_notification(&Notification::PictureStateChanged { ready: false });
        assert!(rx.try_recv().is_err());
        h.controller
            .on_notification(&Notification::PictureStateChanged { ready: true });
        assert!(matches!(rx.try_recv(), Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_disconnect_drops_reply_and_resets_state() {
        let mut h = Harness::new();
        let mut engine = running_engine();
        engine.expect_take_off().return_const(());

        h.controller.on_notification(&grabber(false));
        h.controller.on_notification(&battery(80));
        let rx = h.start(Operation::TakeOff, &mut engine);
        h.controller.on_disconnect();

        assert!(rx.await.is_err());
        assert!(!h.controller.is_busy());
        assert!(!h.controller.has_grabber());
        assert_eq!(h.controller.flying_state(), FlyingState::Landed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_is_ignored() {
        let mut h = Harness::new();
        let mut engine = running_engine();
        engine.expect_cap().return_const(());
        engine.expect_take_off().return_const(());

        let _aborted = h.start(Operation::Turn { angle: 90 }, &mut engine);
        h.controller.on_disconnect();

        let mut rx = h.start(Operation::TakeOff, &mut engine);
        // Turn timer from the previous operation
        h.fire_next_timer().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(h.controller.current_operation(), Some(&Operation::TakeOff));
    }
}
