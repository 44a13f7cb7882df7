//! The tick loop every engine runs.
//!
//! A tick is never raced against shutdown: once started it runs until it
//! finishes or hits `iteration_timeout`, then the loop checks for shutdown.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub name: String,
    pub interval: Duration,
    pub iteration_timeout: Duration,
}

impl LoopConfig {
    pub fn new(name: &str, interval: Duration, iteration_timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            interval,
            iteration_timeout,
        }
    }
}

/// Run `tick` every `cfg.interval` until `cancel` fires.
///
/// Tick errors and timeouts are logged; they never end the loop.
pub async fn run_polling_loop<F, Fut>(cfg: &LoopConfig, cancel: CancellationToken, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    tracing::info!(
        "⏰ {} started (every {:?}, timeout {:?})",
        cfg.name,
        cfg.interval,
        cfg.iteration_timeout
    );

    let mut ticker = tokio::time::interval(cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let started = Instant::now();
        match tokio::time::timeout(cfg.iteration_timeout, tick()).await {
            Ok(Ok(())) => {
                tracing::debug!(loop_name = %cfg.name, elapsed_ms = started.elapsed().as_millis() as u64, "tick done");
            }
            Ok(Err(e)) => {
                tracing::warn!(loop_name = %cfg.name, "⚠️ tick failed: {e}");
            }
            Err(_) => {
                tracing::warn!(loop_name = %cfg.name, "⚠️ tick timed out after {:?}", cfg.iteration_timeout);
            }
        }
    }

    tracing::info!("👋 {} stopped", cfg.name);
}
