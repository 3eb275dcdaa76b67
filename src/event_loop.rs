//! The single worker task.
//!
//! Every piece of protocol and controller state lives here. Inbound frames
//! (delivered by the transport from any thread), caller requests, engine
//! notifications, completion timers and the piloting ticker are all
//! serialized through one `select!` loop, so nothing below needs a lock.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::controller::OperationController;
use crate::engine::types::{Accessory, LightState, Notification};
use crate::engine::{DroneCommands, ProtocolEngine};
use crate::error::{MinidroneError, Result};
use crate::request::Request;
use crate::state::{ConnectionState, DroneState, StateWriters};
use crate::transport::{ByteTransport, LinkEvent, LinkReceiver};

struct Worker {
    transport: Arc<dyn ByteTransport>,
    config: Config,
    writers: StateWriters,

    engine: Option<ProtocolEngine>,
    controller: OperationController,
    light_id: Option<u8>,

    notify_tx: mpsc::UnboundedSender<Notification>,
    connect_at: Option<Pin<Box<Sleep>>>,
    ticker: Option<Interval>,
}

pub(crate) async fn run_event_loop(
    transport: Arc<dyn ByteTransport>,
    mut link_rx: LinkReceiver,
    mut request_rx: mpsc::Receiver<Request>,
    writers: StateWriters,
    config: Config,
    cancel: CancellationToken,
) {
    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
    let (timer_tx, mut timer_rx) = mpsc::unbounded_channel();

    let mut worker = Worker {
        transport,
        controller: OperationController::new(config.operations.clone(), timer_tx),
        config,
        writers,
        engine: None,
        light_id: None,
        notify_tx,
        connect_at: None,
        ticker: None,
    };

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("event loop cancelled");
                break;
            }
            request = request_rx.recv() => {
                match request {
                    Some(Request::Execute { operation, reply }) => {
                        let engine = worker.engine.as_mut().map(|e| e as &mut dyn DroneCommands);
                        worker.controller.execute(operation, reply, engine);
                    }
                    Some(Request::SetLight { state, reply }) => {
                        let _ = reply.send(worker.set_light(state));
                    }
                    Some(Request::Shutdown) | None => {
                        debug!("event loop shutdown requested");
                        break;
                    }
                }
            }
            Some(event) = link_rx.recv() => {
                worker.handle_link_event(event, &mut notify_rx);
            }
            _ = wait_deadline(&mut worker.connect_at) => {
                worker.connect_at = None;
                if let Some(engine) = worker.engine.as_mut() {
                    engine.connect();
                }
            }
            Some(notification) = notify_rx.recv() => {
                worker.handle_notification(notification);
            }
            Some(generation) = timer_rx.recv() => {
                worker.controller.on_timer(generation);
            }
            _ = next_tick(&mut worker.ticker) => {
                if let Some(engine) = worker.engine.as_mut() {
                    engine.tick();
                }
            }
        }

        worker.start_ticker_when_running();
        worker.publish_operation();
    }

    worker.shutdown();
}

impl Worker {
    fn handle_link_event(
        &mut self,
        event: LinkEvent,
        notify_rx: &mut mpsc::UnboundedReceiver<Notification>,
    ) {
        match event {
            LinkEvent::Connected { name, model } => {
                info!("Link up with {} ({})", name, model);
                if self.engine.is_some() {
                    warn!("Link up while already connected, restarting protocol");
                    self.reset(notify_rx);
                }
                self.engine = Some(ProtocolEngine::new(
                    self.transport.clone(),
                    name,
                    model,
                    self.config.piloting.clone(),
                    Box::new(self.notify_tx.clone()),
                ));
                self.connect_at = Some(Box::pin(tokio::time::sleep(
                    self.config.link.connect_delay(),
                )));
                self.writers.drone_state.send_modify(|s| {
                    *s = DroneState {
                        connection: ConnectionState::Connecting,
                        ..Default::default()
                    }
                });
            }
            LinkEvent::Data { endpoint, payload } => match self.engine.as_mut() {
                Some(engine) => engine.handle_frame(endpoint, &payload),
                None => trace!("Dropping frame on {:?}: no link", endpoint),
            },
            LinkEvent::Disconnected => {
                info!("Link down");
                self.reset(notify_rx);
            }
        }
    }

    fn handle_notification(&mut self, notification: Notification) {
        match &notification {
            Notification::FirmwareOutOfDate { version } => {
                warn!("Drone firmware {} is out of date", version);
            }
            Notification::Light { present, id, .. } => {
                self.light_id = present.then_some(*id);
            }
            _ => {}
        }

        self.controller.on_notification(&notification);
        self.writers
            .drone_state
            .send_if_modified(|s| s.apply(&notification));
    }

    fn set_light(&mut self, state: LightState) -> Result<()> {
        let engine = match self.engine.as_mut() {
            Some(engine) if engine.is_running() => engine,
            _ => return Err(MinidroneError::NotConnected),
        };
        let id = self
            .light_id
            .ok_or(MinidroneError::AccessoryMissing(Accessory::Light))?;
        engine.accessory_light(id, state);
        Ok(())
    }

    /// Drop the connection and everything derived from it
    fn reset(&mut self, notify_rx: &mut mpsc::UnboundedReceiver<Notification>) {
        self.engine = None;
        self.connect_at = None;
        self.ticker = None;
        self.light_id = None;
        self.controller.on_disconnect();

        // Notifications of the dropped engine must not reach the next one
        while notify_rx.try_recv().is_ok() {}

        self.writers.drone_state.send_replace(DroneState::default());
    }

    fn start_ticker_when_running(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        let running = self.engine.as_ref().is_some_and(|e| e.is_running());
        if running {
            let period = self.config.piloting.tick();
            debug!("Starting piloting loop every {:?}", period);
            let mut ticker = tokio::time::interval_at(Instant::now(), period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.ticker = Some(ticker);
        }
    }

    fn publish_operation(&self) {
        let current = self.controller.current_operation().cloned();
        self.writers.operation.send_if_modified(|op| {
            if *op == current {
                return false;
            }
            *op = current;
            true
        });
        let busy = self.controller.is_busy();
        self.writers.drone_state.send_if_modified(|s| {
            if s.busy == busy {
                return false;
            }
            s.busy = busy;
            true
        });
    }

    fn shutdown(&mut self) {
        self.engine = None;
        self.controller.on_disconnect();
        self.writers.drone_state.send_replace(DroneState::default());
        self.writers.operation.send_replace(None);
    }
}

async fn wait_deadline(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => pending().await,
    }
}
