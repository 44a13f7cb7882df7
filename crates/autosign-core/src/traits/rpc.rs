use async_trait::async_trait;

use crate::error::Result;
use crate::types::TxOnChainStatus;

/// Per-chain transaction status lookup.
///
/// "Not found yet" is `Ok(Pending)`, never an error.
#[async_trait]
pub trait RpcAdapter: Send + Sync {
    async fn get_tx_status(&self, tx_hash: &str) -> Result<TxOnChainStatus>;
}
