use async_trait::async_trait;
use serde_json::json;

use autosign_core::error::{AutosignError, Result};
use autosign_core::traits::RpcAdapter;
use autosign_core::types::TxOnChainStatus;

use super::JsonRpcClient;

/// Account-model status via `eth_getTransactionReceipt`.
pub struct EvmRpc {
    client: JsonRpcClient,
}

impl EvmRpc {
    pub fn new(client: JsonRpcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RpcAdapter for EvmRpc {
    async fn get_tx_status(&self, tx_hash: &str) -> Result<TxOnChainStatus> {
        let receipt = self
            .client
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?
            .map_err(|e| AutosignError::Rpc(format!("eth_getTransactionReceipt {tx_hash}: {} ({})", e.message, e.code)))?;

        // No receipt until the transaction is mined.
        if receipt.is_null() {
            return Ok(TxOnChainStatus::Pending);
        }
        match receipt.get("status").and_then(|s| s.as_str()) {
            Some("0x1") => Ok(TxOnChainStatus::Success),
            Some("0x0") => Ok(TxOnChainStatus::Fail),
            other => Err(AutosignError::Rpc(format!(
                "receipt for {tx_hash} has unexpected status {other:?}"
            ))),
        }
    }
}
