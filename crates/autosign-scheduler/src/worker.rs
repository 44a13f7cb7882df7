//! Scheduler worker: turns due schedules into queued tasks.
//!
//! One tick handles every due row concurrently and waits for all of them.
//! A failing row never holds back the others; its error is folded into the
//! tick result and the row is retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use autosign_core::config::{SchedulerConfig, TaskQueueConfig};
use autosign_core::error::{AutosignError, Result};
use autosign_core::metrics::Gauge;
use autosign_core::traits::{
    EnqueueOptions, IntervalStrategy, PolicyStore, SafetyGate, SchedulerStore, StoreTx,
    TASK_TYPE_SCHEDULER, Task, TaskQueue, Transactional,
};
use autosign_core::types::{Policy, Schedule};
use autosign_core::util::{Clock, LoopConfig, SystemClock, run_polling_loop};

use crate::interval::FrequencyInterval;

/// Runtime knobs, usually built from [`SchedulerConfig`].
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub queue: String,
    pub interval: Duration,
    pub iteration_timeout: Duration,
    pub task_timeout: Duration,
    pub task_retention: Duration,
}

impl SchedulerOptions {
    pub fn from_config(scheduler: &SchedulerConfig, queues: &TaskQueueConfig) -> Self {
        Self {
            queue: queues.scheduler_queue.clone(),
            interval: scheduler.interval(),
            iteration_timeout: scheduler.iteration_timeout(),
            task_timeout: Duration::from_secs(scheduler.task_timeout_secs),
            task_retention: Duration::from_secs(scheduler.task_retention_secs),
        }
    }

    fn enqueue_options(&self) -> EnqueueOptions {
        EnqueueOptions {
            timeout: self.task_timeout,
            retention: self.task_retention,
            ..EnqueueOptions::fire_once(&self.queue)
        }
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default(), &TaskQueueConfig::default())
    }
}

/// Last-tick gauges.
#[derive(Debug, Default)]
pub struct SchedulerGauges {
    /// Rows due at the start of the last tick.
    pub due: Gauge,
    /// Due rows whose `next_execution` was already in the past at fetch time.
    pub stuck: Gauge,
}

pub struct SchedulerWorker<S, P>
where
    S: SchedulerStore,
    P: PolicyStore<Tx = S::Tx>,
{
    schedules: Arc<S>,
    policies: Arc<P>,
    queue: Arc<dyn TaskQueue>,
    safety: Option<Arc<dyn SafetyGate>>,
    interval: Arc<dyn IntervalStrategy>,
    clock: Arc<dyn Clock>,
    opts: SchedulerOptions,
    gauges: SchedulerGauges,
}

impl<S, P> SchedulerWorker<S, P>
where
    S: SchedulerStore,
    P: PolicyStore<Tx = S::Tx>,
{
    pub fn new(schedules: Arc<S>, policies: Arc<P>, queue: Arc<dyn TaskQueue>, opts: SchedulerOptions) -> Self {
        Self {
            schedules,
            policies,
            queue,
            safety: None,
            interval: Arc::new(FrequencyInterval),
            clock: Arc::new(SystemClock),
            opts,
            gauges: SchedulerGauges::default(),
        }
    }

    /// Consult the operator kill switch before each enqueue.
    pub fn with_safety_gate(mut self, gate: Arc<dyn SafetyGate>) -> Self {
        self.safety = Some(gate);
        self
    }

    pub fn with_interval(mut self, interval: Arc<dyn IntervalStrategy>) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn gauges(&self) -> &SchedulerGauges {
        &self.gauges
    }

    /// Tick every `opts.interval` until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let cfg = LoopConfig::new("scheduler", self.opts.interval, self.opts.iteration_timeout);
        run_polling_loop(&cfg, cancel, || self.tick()).await;
    }

    /// Handle every schedule that is due right now.
    pub async fn tick(&self) -> Result<()> {
        let now = self.clock.now();
        let due = self.schedules.get_pending(now).await?;

        let stuck = due.iter().filter(|s| s.next_execution < now).count();
        self.gauges.due.set(due.len() as i64);
        self.gauges.stuck.set(stuck as i64);

        if due.is_empty() {
            tracing::debug!("no schedules due");
            return Ok(());
        }
        if stuck > 0 {
            tracing::warn!("⚠️ {stuck} schedule(s) overdue");
        }
        tracing::info!("📅 {} schedule(s) due", due.len());

        let results = join_all(due.iter().map(|s| self.handle_row(*s, now))).await;

        let errors: Vec<String> = due
            .iter()
            .zip(results)
            .filter_map(|(s, r)| r.err().map(|e| format!("policy {}: {e}", s.policy_id)))
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AutosignError::Aggregate {
                total: due.len(),
                errors,
            })
        }
    }

    async fn handle_row(&self, schedule: Schedule, now: DateTime<Utc>) -> Result<()> {
        let result = self.process(schedule, now).await;
        if let Err(e) = &result {
            tracing::warn!("⚠️ Schedule for policy {} failed: {e}", schedule.policy_id);
        }
        result
    }

    async fn process(&self, schedule: Schedule, now: DateTime<Utc>) -> Result<()> {
        let policy = self.policies.get_plugin_policy(schedule.policy_id).await?;

        if let Some(gate) = &self.safety {
            match gate.enforce_keysign(&policy.plugin_id).await {
                Ok(()) => {}
                Err(e) if e.is_keysign_disabled() => {
                    tracing::info!("🛑 Keysign disabled for plugin '{}', retiring policy {}", policy.plugin_id, policy.id);
                    return self.deactivate(policy).await;
                }
                Err(e) => return Err(e),
            }
        }

        let next = self.interval.from_now_when_next(&policy, now)?;

        let task = Task::new(TASK_TYPE_SCHEDULER, &schedule)?;
        let info = self.queue.enqueue(task, &self.opts.enqueue_options()).await?;
        tracing::info!("🔔 Policy {} enqueued as task {} on '{}'", policy.id, info.id, info.queue);

        match next {
            Some(next) => self.reschedule(policy.id, next).await,
            None => self.deactivate(policy).await,
        }
    }

    async fn reschedule(&self, policy_id: uuid::Uuid, next: DateTime<Utc>) -> Result<()> {
        let mut tx = self.schedules.begin().await?;
        let result = self.schedules.set_next(&mut tx, policy_id, next).await;
        finish(tx, result).await?;
        tracing::debug!("policy {policy_id} next run at {next}");
        Ok(())
    }

    /// Delete the schedule and mark the policy inactive in one transaction.
    async fn deactivate(&self, mut policy: Policy) -> Result<()> {
        let mut tx = self.schedules.begin().await?;
        policy.active = false;
        let result = async {
            self.schedules.delete(&mut tx, policy.id).await?;
            self.policies.update_plugin_policy(&mut tx, &policy).await?;
            Ok::<(), AutosignError>(())
        }
        .await;
        finish(tx, result).await?;
        tracing::info!("✅ Policy {} completed, schedule removed", policy.id);
        Ok(())
    }
}

async fn finish<T: StoreTx>(tx: T, result: Result<()>) -> Result<()> {
    match result {
        Ok(()) => tx.commit().await,
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                tracing::warn!("⚠️ Rollback failed: {rb}");
            }
            Err(e)
        }
    }
}
