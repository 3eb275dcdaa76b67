//! # Minidrone Library
//!
//! Drive a BLE minidrone (Rolling Spider, Airborne Night, Airborne Cargo,
//! Mambo) over its connection-oriented binary command protocol.
//!
//! The crate is layered bottom-up:
//! - [`arsdk`]: frame codec and sequenced logical channels
//! - [`engine`]: connection handshake, 100 ms piloting loop, notifications
//! - [`controller`]: one high-level operation at a time, each resolved to a
//!   single terminal result
//! - [`drone`]: async caller handle, backed by a single worker task
//!
//! The radio itself is abstracted by [`transport::ByteTransport`];
//! [`transport::sim::SimulatedDrone`] provides an in-process drone.

pub mod arsdk;
pub mod config;
pub mod controller;
pub mod drone;
pub mod engine;
pub mod error;
pub mod state;
pub mod transport;

mod event_loop;
mod request;

pub use config::Config;
pub use controller::{MoveDirection, MoveParams, Operation, TurnDirection};
pub use drone::Drone;
pub use engine::types::{FlipDirection, FlyingState, LightState, Model, Notification};
pub use error::{MinidroneError, Result};
pub use state::{ConnectionState, DroneState};
