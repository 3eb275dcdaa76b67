use tokio::sync::oneshot;

use crate::controller::Operation;
use crate::engine::types::LightState;
use crate::error::Result;

/// Requests from [`crate::drone::Drone`] handles to the worker
pub(crate) enum Request {
    /// Run an operation; the reply carries its terminal result
    Execute {
        operation: Operation,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Set the light accessory; completes once the command is written
    SetLight {
        state: LightState,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}
