//! Domain types shared by all engines.

pub mod chain;
pub mod keysign;
pub mod policy;
pub mod schedule;
pub mod tx;

pub use chain::Chain;
pub use keysign::{HashFunction, KeysignMessage, KeysignRequest, Signature};
pub use policy::{Policy, Recipe, RECIPE_VERSION};
pub use schedule::Schedule;
pub use tx::{CreateTx, Tx, TxOnChainStatus, TxStatus};
