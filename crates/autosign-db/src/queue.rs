//! At-least-once task queue on a single Postgres table.
//!
//! States: `pending → active → completed`, with `active → pending` on a
//! retryable failure and `active → archived` once retries are spent.
//! A claim holds a lease of the task's timeout; an expired lease makes the
//! task claimable again while retries remain.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use autosign_core::error::{AutosignError, Result};
use autosign_core::traits::{EnqueueOptions, Task, TaskInfo, TaskQueue};

use crate::db_err;

/// A task handed to a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedTask {
    pub info: TaskInfo,
    pub task: Task,
    pub retried: u32,
    pub max_retry: u32,
}

#[derive(sqlx::FromRow)]
struct ClaimedRow {
    id: Uuid,
    queue: String,
    task_type: String,
    payload: serde_json::Value,
    retried: i32,
    max_retry: i32,
}

impl From<ClaimedRow> for ClaimedTask {
    fn from(r: ClaimedRow) -> Self {
        ClaimedTask {
            info: TaskInfo {
                id: r.id,
                queue: r.queue,
                task_type: r.task_type.clone(),
            },
            task: Task {
                task_type: r.task_type,
                payload: r.payload,
            },
            retried: r.retried.max(0) as u32,
            max_retry: r.max_retry.max(0) as u32,
        }
    }
}

/// What `fail` did with the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Requeued,
    Archived,
}

impl FailOutcome {
    fn from_state(state: &str) -> Result<Self> {
        match state {
            "pending" => Ok(FailOutcome::Requeued),
            "archived" => Ok(FailOutcome::Archived),
            other => Err(AutosignError::Queue(format!("unexpected task state '{other}' after fail"))),
        }
    }
}

fn secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

#[derive(Clone)]
pub struct PgTaskQueue {
    pool: PgPool,
}

impl PgTaskQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lease the oldest claimable task on `queue`.
    pub async fn claim_next(&self, queue: &str) -> Result<Option<ClaimedTask>> {
        let row = sqlx::query_as::<_, ClaimedRow>(
            r#"
            UPDATE task_queue
            SET state = 'active',
                retried = retried + CASE WHEN state = 'active' THEN 1 ELSE 0 END,
                lease_until = NOW() + make_interval(secs => timeout_secs::double precision)
            WHERE id = (
                SELECT id FROM task_queue
                WHERE queue = $1
                  AND (state = 'pending'
                       OR (state = 'active' AND lease_until < NOW() AND retried < max_retry))
                ORDER BY enqueued_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, queue, task_type, payload, retried, max_retry
            "#,
        )
        .bind(queue)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AutosignError::Queue(format!("claim on '{queue}': {e}")))?;
        Ok(row.map(ClaimedTask::from))
    }

    pub async fn complete(&self, id: Uuid) -> Result<()> {
        let done = sqlx::query(
            r#"
            UPDATE task_queue
            SET state = 'completed', lease_until = NULL, finished_at = NOW()
            WHERE id = $1 AND state = 'active'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(AutosignError::Queue(format!("task {id} is not active")));
        }
        Ok(())
    }

    /// Re-queue while retries remain, archive otherwise.
    pub async fn fail(&self, id: Uuid, error: &str) -> Result<FailOutcome> {
        let state: Option<(String,)> = sqlx::query_as(
            r#"
            UPDATE task_queue
            SET state = CASE WHEN retried < max_retry THEN 'pending' ELSE 'archived' END,
                retried = CASE WHEN retried < max_retry THEN retried + 1 ELSE retried END,
                finished_at = CASE WHEN retried < max_retry THEN NULL ELSE NOW() END,
                last_error = $2,
                lease_until = NULL
            WHERE id = $1 AND state = 'active'
            RETURNING state
            "#,
        )
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        let (state,) = state.ok_or_else(|| AutosignError::Queue(format!("task {id} is not active")))?;
        let outcome = FailOutcome::from_state(&state)?;
        tracing::warn!("⚠️ Task {id} failed ({outcome:?}): {error}");
        Ok(outcome)
    }

    /// Archive abandoned leases, then drop finished tasks past their retention.
    pub async fn purge_expired(&self) -> Result<u64> {
        let abandoned = sqlx::query(
            r#"
            UPDATE task_queue
            SET state = 'archived',
                finished_at = NOW(),
                last_error = COALESCE(last_error, 'lease expired'),
                lease_until = NULL
            WHERE state = 'active' AND lease_until < NOW() AND retried >= max_retry
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        let purged = sqlx::query(
            r#"
            DELETE FROM task_queue
            WHERE state IN ('completed', 'archived')
              AND finished_at + make_interval(secs => retention_secs::double precision) < NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        if abandoned > 0 || purged > 0 {
            tracing::info!("🧹 Task queue: {abandoned} abandoned, {purged} purged");
        }
        Ok(purged)
    }
}

#[async_trait]
impl TaskQueue for PgTaskQueue {
    async fn enqueue(&self, task: Task, opts: &EnqueueOptions) -> Result<TaskInfo> {
        let id = Uuid::new_v4();
        let max_retry = i32::try_from(opts.max_retry)
            .map_err(|_| AutosignError::Queue(format!("max_retry {} out of range", opts.max_retry)))?;
        sqlx::query(
            r#"
            INSERT INTO task_queue (id, queue, task_type, payload, max_retry, timeout_secs, retention_secs)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(&opts.queue)
        .bind(&task.task_type)
        .bind(&task.payload)
        .bind(max_retry)
        .bind(secs(opts.timeout))
        .bind(secs(opts.retention))
        .execute(&self.pool)
        .await
        .map_err(|e| AutosignError::Queue(format!("enqueue {} on '{}': {e}", task.task_type, opts.queue)))?;

        Ok(TaskInfo {
            id,
            queue: opts.queue.clone(),
            task_type: task.task_type,
        })
    }
}
