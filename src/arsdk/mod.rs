//! # ARSDK Protocol Module
//!
//! Wire layer of the minidrone command protocol.
//!
//! This module provides:
//! - Frame layout constants and id triples (`protocol`)
//! - Command encoding (`encoder`)
//! - Event decoding (`decoder`)
//! - Sequenced logical channels over a byte transport (`channel`)

pub mod channel;
pub mod decoder;
pub mod encoder;
pub mod protocol;
