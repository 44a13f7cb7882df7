//! Repository contracts.
//!
//! Mutating calls take an explicit transaction handle obtained from
//! [`Transactional::begin`]; dropping a handle without committing rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{CreateTx, Policy, Schedule, Tx, TxOnChainStatus, TxStatus};

/// An open storage transaction.
#[async_trait]
pub trait StoreTx: Send + Sized {
    async fn commit(self) -> Result<()>;
    async fn rollback(self) -> Result<()>;
}

/// A store that can open transactions.
#[async_trait]
pub trait Transactional: Send + Sync {
    type Tx: StoreTx;

    async fn begin(&self) -> Result<Self::Tx>;
}

/// Policy storage, read-mostly from the engines' point of view.
#[async_trait]
pub trait PolicyStore: Transactional {
    /// Fails with `PolicyNotFound` when no such policy exists.
    async fn get_plugin_policy(&self, id: Uuid) -> Result<Policy>;

    async fn get_policy_by_public_key_and_plugin(
        &self,
        public_key: &str,
        plugin_id: &str,
    ) -> Result<Option<Policy>>;

    async fn update_plugin_policy(&self, tx: &mut Self::Tx, policy: &Policy) -> Result<Policy>;
}

/// `(policy_id, next_execution)` rows.
#[async_trait]
pub trait SchedulerStore: Transactional {
    async fn create(&self, tx: &mut Self::Tx, policy_id: Uuid, next: DateTime<Utc>) -> Result<()>;

    async fn get_by_policy(&self, policy_id: Uuid) -> Result<Option<Schedule>>;

    /// Every row with `next_execution <= now`.
    async fn get_pending(&self, now: DateTime<Utc>) -> Result<Vec<Schedule>>;

    async fn set_next(&self, tx: &mut Self::Tx, policy_id: Uuid, next: DateTime<Utc>) -> Result<()>;

    async fn delete(&self, tx: &mut Self::Tx, policy_id: Uuid) -> Result<()>;
}

/// Rows pulled one at a time from storage.
pub type TxStream = BoxStream<'static, Result<Tx>>;

/// Transaction index storage.
#[async_trait]
pub trait TxIndexerStore: Send + Sync {
    async fn create_tx(&self, req: CreateTx) -> Result<Tx>;

    async fn get_tx_by_id(&self, id: Uuid) -> Result<Option<Tx>>;

    fn get_tx_in_time_range(
        &self,
        plugin_id: &str,
        policy_id: Uuid,
        recipient_public_key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> TxStream;

    async fn set_status(&self, id: Uuid, status: TxStatus) -> Result<()>;

    /// PROPOSED/VERIFIED → SIGNED with `status_onchain = PENDING` and `broadcasted_at = now`.
    async fn set_signed_and_broadcasted(&self, id: Uuid, tx_hash: &str) -> Result<()>;

    /// Only applies to rows that are still pending and not lost.
    async fn set_on_chain_status(&self, id: Uuid, status: TxOnChainStatus) -> Result<()>;

    async fn set_lost(&self, id: Uuid) -> Result<()>;

    /// Rows with `status_onchain = PENDING AND lost = false`.
    fn get_pending_txs(&self) -> TxStream;
}
