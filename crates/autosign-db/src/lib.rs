//! # Autosign DB
//!
//! Postgres storage behind the core repository traits. All SQL is
//! runtime-checked (`sqlx::query`), so building needs no live database.

pub mod migrate;
pub mod policy;
pub mod pool;
pub mod queue;
mod rows;
pub mod safety;
pub mod scheduler;
pub mod transaction;
pub mod tx;

pub use migrate::MigrationRunner;
pub use policy::PgPolicyStore;
pub use pool::connect;
pub use queue::{ClaimedTask, FailOutcome, PgTaskQueue};
pub use safety::PgSafetyGate;
pub use scheduler::PgSchedulerStore;
pub use transaction::PgTx;
pub use tx::PgTxStore;

use autosign_core::error::AutosignError;

pub(crate) fn db_err(e: sqlx::Error) -> AutosignError {
    AutosignError::Database(e.to_string())
}
