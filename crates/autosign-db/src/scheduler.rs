use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use autosign_core::error::{AutosignError, Result};
use autosign_core::traits::{SchedulerStore, Transactional};
use autosign_core::types::Schedule;

use crate::db_err;
use crate::rows::ScheduleRow;
use crate::transaction::PgTx;

/// Postgres-backed `scheduler` table.
#[derive(Clone)]
pub struct PgSchedulerStore {
    pool: PgPool,
}

impl PgSchedulerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Transactional for PgSchedulerStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        PgTx::begin(&self.pool).await
    }
}

#[async_trait]
impl SchedulerStore for PgSchedulerStore {
    async fn create(&self, tx: &mut PgTx, policy_id: Uuid, next: DateTime<Utc>) -> Result<()> {
        sqlx::query("INSERT INTO scheduler (policy_id, next_execution) VALUES ($1, $2)")
            .bind(policy_id)
            .bind(next)
            .execute(tx.conn())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_by_policy(&self, policy_id: Uuid) -> Result<Option<Schedule>> {
        let row = sqlx::query_as::<_, ScheduleRow>(
            "SELECT policy_id, next_execution FROM scheduler WHERE policy_id = $1",
        )
        .bind(policy_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(Schedule::from))
    }

    async fn get_pending(&self, now: DateTime<Utc>) -> Result<Vec<Schedule>> {
        let rows = sqlx::query_as::<_, ScheduleRow>(
            r#"
            SELECT policy_id, next_execution
            FROM scheduler
            WHERE next_execution <= $1
            ORDER BY next_execution
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Schedule::from).collect())
    }

    async fn set_next(&self, tx: &mut PgTx, policy_id: Uuid, next: DateTime<Utc>) -> Result<()> {
        let done = sqlx::query("UPDATE scheduler SET next_execution = $2 WHERE policy_id = $1")
            .bind(policy_id)
            .bind(next)
            .execute(tx.conn())
            .await
            .map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(AutosignError::Database(format!("no schedule for policy {policy_id}")));
        }
        Ok(())
    }

    async fn delete(&self, tx: &mut PgTx, policy_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM scheduler WHERE policy_id = $1")
            .bind(policy_id)
            .execute(tx.conn())
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
