//! `tx_indexer` storage.
//!
//! State transitions are conditional `UPDATE`s, so replays and concurrent
//! workers can only move a row forward.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use sqlx::PgPool;
use uuid::Uuid;

use autosign_core::error::{AutosignError, Result};
use autosign_core::traits::{TxIndexerStore, TxStream};
use autosign_core::types::{CreateTx, Tx, TxOnChainStatus, TxStatus};
use autosign_core::util::produce;

use crate::db_err;
use crate::rows::TxRow;

const TX_COLUMNS: &str = "id, plugin_id, chain_id, policy_id, from_public_key, to_public_key, \
    proposed_tx_hex, tx_hash, status, status_onchain, lost, broadcasted_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgTxStore {
    pool: PgPool,
}

impl PgTxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TxIndexerStore for PgTxStore {
    async fn create_tx(&self, req: CreateTx) -> Result<Tx> {
        let sql = format!(
            r#"
            INSERT INTO tx_indexer
                (id, plugin_id, chain_id, policy_id, from_public_key, to_public_key, proposed_tx_hex)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {TX_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, TxRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&req.plugin_id)
            .bind(req.chain.as_str())
            .bind(req.policy_id)
            .bind(&req.from_public_key)
            .bind(&req.to_public_key)
            .bind(&req.proposed_tx_hex)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Tx::try_from(row)
    }

    async fn get_tx_by_id(&self, id: Uuid) -> Result<Option<Tx>> {
        let sql = format!("SELECT {TX_COLUMNS} FROM tx_indexer WHERE id = $1");
        sqlx::query_as::<_, TxRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(Tx::try_from)
            .transpose()
    }

    fn get_tx_in_time_range(
        &self,
        plugin_id: &str,
        policy_id: Uuid,
        recipient_public_key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> TxStream {
        let pool = self.pool.clone();
        let plugin_id = plugin_id.to_string();
        let recipient = recipient_public_key.to_string();
        produce(move |sink| async move {
            let sql = format!(
                r#"
                SELECT {TX_COLUMNS}
                FROM tx_indexer
                WHERE plugin_id = $1
                  AND policy_id = $2
                  AND to_public_key = $3
                  AND created_at >= $4
                  AND created_at <= $5
                ORDER BY created_at
                "#
            );
            let mut rows = sqlx::query_as::<_, TxRow>(&sql)
                .bind(plugin_id)
                .bind(policy_id)
                .bind(recipient)
                .bind(from)
                .bind(to)
                .fetch(&pool);
            while let Some(row) = rows.next().await {
                if !sink.send(row.map_err(db_err).and_then(Tx::try_from)).await {
                    break;
                }
            }
        })
    }

    async fn set_status(&self, id: Uuid, status: TxStatus) -> Result<()> {
        let done = sqlx::query("UPDATE tx_indexer SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(AutosignError::TxNotFound(id));
        }
        Ok(())
    }

    async fn set_signed_and_broadcasted(&self, id: Uuid, tx_hash: &str) -> Result<()> {
        let done = sqlx::query(
            r#"
            UPDATE tx_indexer
            SET status = 'SIGNED',
                tx_hash = $2,
                status_onchain = 'PENDING',
                broadcasted_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status IN ('PROPOSED', 'VERIFIED')
            "#,
        )
        .bind(id)
        .bind(tx_hash)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(AutosignError::InvalidTxState(format!(
                "tx {id} does not exist or is already signed"
            )));
        }
        Ok(())
    }

    async fn set_on_chain_status(&self, id: Uuid, status: TxOnChainStatus) -> Result<()> {
        let done = sqlx::query(
            r#"
            UPDATE tx_indexer
            SET status_onchain = $2, updated_at = NOW()
            WHERE id = $1 AND status_onchain = 'PENDING' AND NOT lost
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if done.rows_affected() == 0 {
            tracing::debug!("tx {id} already resolved, on-chain status {status} not written");
        }
        Ok(())
    }

    async fn set_lost(&self, id: Uuid) -> Result<()> {
        let done = sqlx::query("UPDATE tx_indexer SET lost = TRUE, updated_at = NOW() WHERE id = $1 AND NOT lost")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if done.rows_affected() == 0 {
            tracing::debug!("tx {id} already lost");
        }
        Ok(())
    }

    fn get_pending_txs(&self) -> TxStream {
        let pool = self.pool.clone();
        produce(move |sink| async move {
            let sql = format!(
                "SELECT {TX_COLUMNS} FROM tx_indexer WHERE status_onchain = 'PENDING' AND NOT lost ORDER BY broadcasted_at"
            );
            let mut rows = sqlx::query_as::<_, TxRow>(&sql).fetch(&pool);
            while let Some(row) = rows.next().await {
                if !sink.send(row.map_err(db_err).and_then(Tx::try_from)).await {
                    tracing::debug!("pending tx consumer gone");
                    break;
                }
            }
        })
    }
}
