//! # Autosign Keysign
//!
//! Coordinates one threshold-signature session per request:
//! emitters hand the request to every cosigner, the relay is polled until the
//! expected parties join, the session is started, and signatures are
//! collected once every party reports completion.

pub mod emitter;
pub mod relay;
pub mod signer;

#[cfg(test)]
pub(crate) mod test_server;

pub use emitter::{HttpEmitter, QueueEmitter};
pub use relay::HttpRelay;
pub use signer::{Signer, message_id};
