//! # Autosign Core
//! Shared domain model, error type, configuration and capability traits.
//!
//! ```text
//! Policy ──► Schedule ──► Task Queue ──► plugin builds tx
//!                                          │
//!                              KeysignRequest ──► Emitters ──► Relay session
//!                                          │
//!                                  Tx (PENDING) ──► Tx Indexer ──► SUCCESS / FAIL / lost
//! ```
//!
//! The engines only depend on the traits in [`traits`]; the Postgres, HTTP
//! and JSON-RPC implementations live in their own crates.

pub mod config;
pub mod error;
pub mod metrics;
pub mod traits;
pub mod types;
pub mod util;

pub use error::{AutosignError, Result};
