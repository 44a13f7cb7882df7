use async_trait::async_trait;
use serde_json::json;

use autosign_core::error::{AutosignError, Result};
use autosign_core::traits::RpcAdapter;
use autosign_core::types::TxOnChainStatus;

use super::JsonRpcClient;

/// `RPC_INVALID_ADDRESS_OR_KEY`: the node does not know the transaction.
const TX_NOT_FOUND: i64 = -5;

/// UTXO-model status via `getrawtransaction <hash> true`.
pub struct BitcoinRpc {
    client: JsonRpcClient,
}

impl BitcoinRpc {
    pub fn new(client: JsonRpcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RpcAdapter for BitcoinRpc {
    async fn get_tx_status(&self, tx_hash: &str) -> Result<TxOnChainStatus> {
        let result = match self.client.call("getrawtransaction", json!([tx_hash, true])).await? {
            Ok(result) => result,
            Err(e) if e.code == TX_NOT_FOUND => return Ok(TxOnChainStatus::Pending),
            Err(e) => {
                return Err(AutosignError::Rpc(format!(
                    "getrawtransaction {tx_hash}: {} ({})",
                    e.message, e.code
                )));
            }
        };
        if result.is_null() {
            return Ok(TxOnChainStatus::Pending);
        }
        // Absent while the transaction sits in the mempool.
        let confirmations = result.get("confirmations").and_then(|c| c.as_u64()).unwrap_or(0);
        if confirmations >= 1 {
            Ok(TxOnChainStatus::Success)
        } else {
            Ok(TxOnChainStatus::Pending)
        }
    }
}
