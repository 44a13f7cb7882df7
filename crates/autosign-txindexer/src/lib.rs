//! # Autosign Tx Indexer
//!
//! Follows every broadcast transaction until the chain reports success or
//! failure, or until it is declared lost.
//!
//! ```text
//! get_pending_txs() ──► for_each_concurrent(limit)
//!                         ├── broadcast too long ago ──► set_lost
//!                         ├── no RPC for chain     ──► set_lost
//!                         └── rpc.get_tx_status    ──► set_on_chain_status (only on change)
//! ```

pub mod rpc;
pub mod service;
pub mod worker;

pub use rpc::{BitcoinRpc, EvmRpc, JsonRpcClient, build_adapters};
pub use service::TxIndexerService;
pub use worker::{RowOutcome, TickStats, TxIndexerGauges, TxIndexerOptions, TxIndexerWorker};
