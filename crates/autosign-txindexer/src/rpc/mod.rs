//! Chain RPC adapters.
//!
//! Both adapters speak JSON-RPC over HTTP through [`JsonRpcClient`].

mod bitcoin;
mod evm;

pub use bitcoin::BitcoinRpc;
pub use evm::EvmRpc;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use autosign_core::config::ChainRpcConfig;
use autosign_core::error::{AutosignError, Result};
use autosign_core::traits::RpcAdapter;
use autosign_core::types::Chain;

const RPC_TIMEOUT: Duration = Duration::from_secs(15);

/// Error object of a JSON-RPC response.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RpcErrorObject {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Minimal JSON-RPC 2.0 client.
pub struct JsonRpcClient {
    url: String,
    username: Option<String>,
    password: Option<String>,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(cfg: &ChainRpcConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| AutosignError::Rpc(format!("client init: {e}")))?;
        Ok(Self {
            url: cfg.url.clone(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Outer `Err` is transport or decoding; inner `Err` is the node's error object.
    pub async fn call(&self, method: &str, params: Value) -> Result<std::result::Result<Value, RpcErrorObject>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut req = self.client.post(&self.url).json(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }));
        if let Some(user) = &self.username {
            req = req.basic_auth(user, self.password.as_ref());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| AutosignError::Rpc(format!("{method} to {}: {e}", self.url)))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AutosignError::Rpc(format!("{method}: read body: {e}")))?;

        // Bitcoin Core answers errors with HTTP 500 and a JSON-RPC body.
        let envelope: RpcEnvelope = match serde_json::from_str(&text) {
            Ok(env) => env,
            Err(_) if !status.is_success() => {
                return Err(AutosignError::Rpc(format!("{method}: HTTP {status}: {text}")));
            }
            Err(e) => return Err(AutosignError::Rpc(format!("{method}: malformed response: {e}"))),
        };
        match envelope.error {
            Some(err) => Ok(Err(err)),
            None => Ok(Ok(envelope.result)),
        }
    }
}

/// One adapter per configured chain.
pub fn build_adapters(endpoints: &[(Chain, ChainRpcConfig)]) -> Result<HashMap<Chain, Arc<dyn RpcAdapter>>> {
    let mut adapters: HashMap<Chain, Arc<dyn RpcAdapter>> = HashMap::new();
    for (chain, cfg) in endpoints {
        let client = JsonRpcClient::new(cfg)?;
        let adapter: Arc<dyn RpcAdapter> = if chain.is_evm() {
            Arc::new(EvmRpc::new(client))
        } else {
            Arc::new(BitcoinRpc::new(client))
        };
        tracing::info!("🔗 RPC adapter for {chain}: {}", cfg.url);
        adapters.insert(*chain, adapter);
    }
    Ok(adapters)
}
