//! Entry point for plugins recording the transactions they propose.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use uuid::Uuid;

use autosign_core::error::{AutosignError, Result};
use autosign_core::traits::TxIndexerStore;
use autosign_core::types::{CreateTx, Tx, TxStatus};

pub struct TxIndexerService {
    store: Arc<dyn TxIndexerStore>,
}

impl TxIndexerService {
    pub fn new(store: Arc<dyn TxIndexerStore>) -> Self {
        Self { store }
    }

    /// Record a freshly proposed transaction.
    pub async fn create_tx(&self, req: CreateTx) -> Result<Tx> {
        if req.proposed_tx_hex.is_empty() {
            return Err(AutosignError::InvalidTxState("proposed_tx_hex is empty".into()));
        }
        let tx = self.store.create_tx(req).await?;
        ensure_consistent(&tx)?;
        tracing::debug!("tx {} proposed on {}", tx.id, tx.chain_id);
        Ok(tx)
    }

    pub async fn get_tx(&self, id: Uuid) -> Result<Tx> {
        let tx = self.store.get_tx_by_id(id).await?.ok_or(AutosignError::TxNotFound(id))?;
        ensure_consistent(&tx)?;
        Ok(tx)
    }

    pub async fn mark_verified(&self, id: Uuid) -> Result<()> {
        let tx = self.get_tx(id).await?;
        if tx.status != TxStatus::Proposed {
            return Err(AutosignError::InvalidTxState(format!(
                "tx {id} is {}, only PROPOSED can be verified",
                tx.status.as_str()
            )));
        }
        self.store.set_status(id, TxStatus::Verified).await
    }

    /// Start on-chain tracking for a transaction that was just broadcast.
    pub async fn set_signed_and_broadcasted(&self, id: Uuid, tx_hash: &str) -> Result<()> {
        if tx_hash.is_empty() {
            return Err(AutosignError::InvalidTxState(format!("tx {id}: empty tx hash")));
        }
        let tx = self.get_tx(id).await?;
        if tx.status == TxStatus::Signed {
            return Err(AutosignError::InvalidTxState(format!("tx {id} is already signed")));
        }
        self.store.set_signed_and_broadcasted(id, tx_hash).await?;
        tracing::info!("📡 Tx {id} broadcast as {tx_hash}");
        Ok(())
    }

    /// Every transaction for `(plugin, policy, recipient)` created in `[from, to]`.
    pub async fn tx_in_time_range(
        &self,
        plugin_id: &str,
        policy_id: Uuid,
        recipient_public_key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Tx>> {
        if from > to {
            return Err(AutosignError::InvalidRequest(format!("range start {from} is after end {to}")));
        }
        self.store
            .get_tx_in_time_range(plugin_id, policy_id, recipient_public_key, from, to)
            .try_collect()
            .await
    }
}

fn ensure_consistent(tx: &Tx) -> Result<()> {
    if tx.has_consistent_broadcast_state() {
        Ok(())
    } else {
        Err(AutosignError::InvalidTxState(format!(
            "tx {}: status_onchain and broadcasted_at must be set together",
            tx.id
        )))
    }
}
