//! Tx indexer worker: resolves on-chain status of broadcast transactions.
//!
//! Rows are pulled from storage one at a time and checked under a
//! concurrency limit. A failing row is logged and counted; it never fails
//! the tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use autosign_core::config::TxIndexerConfig;
use autosign_core::error::{AutosignError, Result};
use autosign_core::metrics::Gauge;
use autosign_core::traits::{RpcAdapter, TxIndexerStore};
use autosign_core::types::{Chain, Tx, TxOnChainStatus};
use autosign_core::util::{Clock, Locked, LoopConfig, SystemClock, run_polling_loop};

#[derive(Debug, Clone)]
pub struct TxIndexerOptions {
    pub interval: Duration,
    pub iteration_timeout: Duration,
    pub concurrency: usize,
    pub mark_lost_after: chrono::Duration,
}

impl TxIndexerOptions {
    pub fn from_config(cfg: &TxIndexerConfig) -> Result<Self> {
        Ok(Self {
            interval: cfg.interval(),
            iteration_timeout: cfg.iteration_timeout(),
            concurrency: cfg.concurrency.max(1),
            mark_lost_after: cfg.mark_lost_after()?,
        })
    }
}

impl Default for TxIndexerOptions {
    fn default() -> Self {
        let cfg = TxIndexerConfig::default();
        Self {
            interval: cfg.interval(),
            iteration_timeout: cfg.iteration_timeout(),
            concurrency: cfg.concurrency,
            mark_lost_after: chrono::Duration::days(1),
        }
    }
}

/// What happened to one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Unchanged,
    Updated(TxOnChainStatus),
    LostByTimeout,
    LostUnsupportedChain,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub processed: usize,
    pub updated: usize,
    pub lost: usize,
    pub failed: usize,
}

impl TickStats {
    fn record(&mut self, outcome: &Result<RowOutcome>) {
        self.processed += 1;
        match outcome {
            Ok(RowOutcome::Unchanged) => {}
            Ok(RowOutcome::Updated(_)) => self.updated += 1,
            Ok(RowOutcome::LostByTimeout | RowOutcome::LostUnsupportedChain) => self.lost += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Counters from the last tick.
#[derive(Debug, Default)]
pub struct TxIndexerGauges {
    pub processed: Gauge,
    pub updated: Gauge,
    pub lost: Gauge,
    pub failed: Gauge,
}

impl TxIndexerGauges {
    fn publish(&self, stats: &TickStats) {
        self.processed.set(stats.processed as i64);
        self.updated.set(stats.updated as i64);
        self.lost.set(stats.lost as i64);
        self.failed.set(stats.failed as i64);
    }
}

pub struct TxIndexerWorker {
    store: Arc<dyn TxIndexerStore>,
    rpcs: HashMap<Chain, Arc<dyn RpcAdapter>>,
    clock: Arc<dyn Clock>,
    opts: TxIndexerOptions,
    gauges: TxIndexerGauges,
}

impl TxIndexerWorker {
    pub fn new(
        store: Arc<dyn TxIndexerStore>,
        rpcs: HashMap<Chain, Arc<dyn RpcAdapter>>,
        opts: TxIndexerOptions,
    ) -> Self {
        Self {
            store,
            rpcs,
            clock: Arc::new(SystemClock),
            opts,
            gauges: TxIndexerGauges::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn gauges(&self) -> &TxIndexerGauges {
        &self.gauges
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let cfg = LoopConfig::new("tx indexer", self.opts.interval, self.opts.iteration_timeout);
        run_polling_loop(&cfg, cancel, || async { self.tick().await.map(|_| ()) }).await;
    }

    /// Check every pending row once.
    pub async fn tick(&self) -> Result<TickStats> {
        let now = self.clock.now();
        let stats = Locked::new(TickStats::default());

        self.store
            .get_pending_txs()
            .for_each_concurrent(self.opts.concurrency.max(1), |row| {
                let stats = &stats;
                async move {
                    let outcome = match row {
                        Ok(tx) => self.process_row(&tx, now).await.inspect_err(|e| {
                            tracing::warn!("⚠️ Tx {} ({}): {e}", tx.id, tx.chain_id);
                        }),
                        Err(e) => {
                            tracing::warn!("⚠️ Pending tx stream: {e}");
                            Err(e)
                        }
                    };
                    stats.with(|s| s.record(&outcome));
                }
            })
            .await;

        let stats = stats.into_inner();
        self.gauges.publish(&stats);
        if stats.processed > 0 {
            tracing::info!(
                "🔎 Indexed {} tx(s): {} updated, {} lost, {} failed",
                stats.processed,
                stats.updated,
                stats.lost,
                stats.failed
            );
        }
        Ok(stats)
    }

    /// Loss checks run before any RPC call.
    pub async fn process_row(&self, tx: &Tx, now: DateTime<Utc>) -> Result<RowOutcome> {
        if tx.is_lost_by_timeout(now, self.opts.mark_lost_after) {
            self.store.set_lost(tx.id).await?;
            tracing::info!("🕳️ Tx {} lost: not confirmed since {:?}", tx.id, tx.broadcasted_at);
            return Ok(RowOutcome::LostByTimeout);
        }

        let Some(rpc) = tx.chain().and_then(|chain| self.rpcs.get(&chain)) else {
            self.store.set_lost(tx.id).await?;
            tracing::info!("🕳️ Tx {} lost: no RPC for chain '{}'", tx.id, tx.chain_id);
            return Ok(RowOutcome::LostUnsupportedChain);
        };

        let hash = tx
            .tx_hash
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AutosignError::InvalidTxState(format!("tx {} is pending without a hash", tx.id)))?;

        let status = rpc.get_tx_status(hash).await?;
        if tx.status_onchain == Some(status) {
            return Ok(RowOutcome::Unchanged);
        }
        self.store.set_on_chain_status(tx.id, status).await?;
        tracing::info!("📦 Tx {} on {}: {status}", tx.id, tx.chain_id);
        Ok(RowOutcome::Updated(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use autosign_core::traits::TxStream;
    use autosign_core::types::{CreateTx, TxStatus};
    use autosign_core::util::ManualClock;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    #[derive(Default)]
    struct MemTxStore {
        rows: Locked<Vec<Tx>>,
        broken_row: bool,
    }

    impl MemTxStore {
        fn row(&self, id: Uuid) -> Tx {
            self.rows.with(|r| r.iter().find(|t| t.id == id).cloned().unwrap())
        }

        fn update(&self, id: Uuid, f: impl FnOnce(&mut Tx)) -> Result<()> {
            self.rows.with(|r| match r.iter_mut().find(|t| t.id == id) {
                Some(tx) => {
                    f(tx);
                    Ok(())
                }
                None => Err(AutosignError::TxNotFound(id)),
            })
        }
    }

    #[async_trait]
    impl TxIndexerStore for MemTxStore {
        async fn create_tx(&self, _req: CreateTx) -> Result<Tx> {
            unimplemented!()
        }

        async fn get_tx_by_id(&self, id: Uuid) -> Result<Option<Tx>> {
            Ok(self.rows.with(|r| r.iter().find(|t| t.id == id).cloned()))
        }

        fn get_tx_in_time_range(
            &self,
            _plugin_id: &str,
            _policy_id: Uuid,
            _recipient_public_key: &str,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> TxStream {
            stream::empty().boxed()
        }

        async fn set_status(&self, id: Uuid, status: TxStatus) -> Result<()> {
            self.update(id, |t| t.status = status)
        }

        async fn set_signed_and_broadcasted(&self, _id: Uuid, _tx_hash: &str) -> Result<()> {
            unimplemented!()
        }

        async fn set_on_chain_status(&self, id: Uuid, status: TxOnChainStatus) -> Result<()> {
            self.update(id, |t| t.status_onchain = Some(status))
        }

        async fn set_lost(&self, id: Uuid) -> Result<()> {
            self.update(id, |t| t.lost = true)
        }

        fn get_pending_txs(&self) -> TxStream {
            let mut items: Vec<Result<Tx>> = self.rows.with(|r| {
                r.iter()
                    .filter(|t| t.status_onchain == Some(TxOnChainStatus::Pending) && !t.lost)
                    .cloned()
                    .map(Ok)
                    .collect()
            });
            if self.broken_row {
                items.push(Err(AutosignError::Database("row decode failed".into())));
            }
            stream::iter(items).boxed()
        }
    }

    /// Returns a fixed status and counts calls.
    struct FixedRpc {
        status: Result<TxOnChainStatus>,
        calls: Locked<usize>,
    }

    impl FixedRpc {
        fn new(status: Result<TxOnChainStatus>) -> Arc<Self> {
            Arc::new(Self {
                status,
                calls: Locked::new(0),
            })
        }
    }

    #[async_trait]
    impl RpcAdapter for FixedRpc {
        async fn get_tx_status(&self, _tx_hash: &str) -> Result<TxOnChainStatus> {
            self.calls.with(|c| *c += 1);
            match &self.status {
                Ok(s) => Ok(*s),
                Err(e) => Err(AutosignError::Rpc(e.to_string())),
            }
        }
    }

    /// Holds each call open briefly and records the peak number in flight.
    #[derive(Default)]
    struct SlowRpc {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl RpcAdapter for SlowRpc {
        async fn get_tx_status(&self, _tx_hash: &str) -> Result<TxOnChainStatus> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(TxOnChainStatus::Pending)
        }
    }

    fn pending_tx(chain: &str, broadcasted_at: DateTime<Utc>) -> Tx {
        Tx {
            id: Uuid::new_v4(),
            plugin_id: "dca".into(),
            chain_id: chain.into(),
            policy_id: Uuid::new_v4(),
            from_public_key: "02from".into(),
            to_public_key: "02to".into(),
            proposed_tx_hex: "0xdead".into(),
            tx_hash: Some("0xhash".into()),
            status: TxStatus::Signed,
            status_onchain: Some(TxOnChainStatus::Pending),
            lost: false,
            broadcasted_at: Some(broadcasted_at),
            created_at: broadcasted_at,
            updated_at: broadcasted_at,
        }
    }

    fn worker(store: Arc<MemTxStore>, rpcs: Vec<(Chain, Arc<FixedRpc>)>, clock: Arc<ManualClock>) -> TxIndexerWorker {
        let rpcs = rpcs
            .into_iter()
            .map(|(c, r)| (c, r as Arc<dyn RpcAdapter>))
            .collect();
        let opts = TxIndexerOptions {
            concurrency: 4,
            ..TxIndexerOptions::default()
        };
        TxIndexerWorker::new(store, rpcs, opts).with_clock(clock)
    }

    #[tokio::test]
    async fn test_lost_by_timeout_wins_over_success() {
        let now = Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let mark_lost_after = TxIndexerOptions::default().mark_lost_after;
        let tx = pending_tx("ethereum", now - mark_lost_after - chrono::Duration::seconds(1));
        let id = tx.id;
        let store = Arc::new(MemTxStore::default());
        store.rows.with(|r| r.push(tx));
        let rpc = FixedRpc::new(Ok(TxOnChainStatus::Success));

        let w = worker(store.clone(), vec![(Chain::Ethereum, rpc.clone())], clock);
        let stats = w.tick().await.unwrap();

        assert_eq!(stats.lost, 1);
        assert_eq!(rpc.calls.get(), 0);
        let row = store.row(id);
        assert!(row.lost);
        assert_eq!(row.status_onchain, Some(TxOnChainStatus::Pending));
    }

    #[tokio::test]
    async fn test_unsupported_chain_lost_on_first_tick() {
        let now = Utc::now();
        let store = Arc::new(MemTxStore::default());
        let unknown = pending_tx("dogecoin", now);
        let unconfigured = pending_tx("polygon", now);
        let (a, b) = (unknown.id, unconfigured.id);
        store.rows.with(|r| r.extend([unknown, unconfigured]));

        let w = worker(store.clone(), vec![], Arc::new(ManualClock::new(now)));
        let stats = w.tick().await.unwrap();

        assert_eq!(stats, TickStats { processed: 2, updated: 0, lost: 2, failed: 0 });
        assert!(store.row(a).lost);
        assert!(store.row(b).lost);

        // Lost rows drop out of the pending set.
        let stats = w.tick().await.unwrap();
        assert_eq!(stats.processed, 0);
    }

    #[tokio::test]
    async fn test_status_written_only_on_change() {
        let now = Utc::now();
        let store = Arc::new(MemTxStore::default());
        let tx = pending_tx("bitcoin", now);
        let id = tx.id;
        store.rows.with(|r| r.push(tx));

        let w = worker(
            store.clone(),
            vec![(Chain::Bitcoin, FixedRpc::new(Ok(TxOnChainStatus::Pending)))],
            Arc::new(ManualClock::new(now)),
        );
        let stats = w.tick().await.unwrap();
        assert_eq!(stats, TickStats { processed: 1, updated: 0, lost: 0, failed: 0 });

        let w = worker(
            store.clone(),
            vec![(Chain::Bitcoin, FixedRpc::new(Ok(TxOnChainStatus::Success)))],
            Arc::new(ManualClock::new(now)),
        );
        let stats = w.tick().await.unwrap();
        assert_eq!(stats.updated, 1);
        assert_eq!(store.row(id).status_onchain, Some(TxOnChainStatus::Success));
        assert_eq!(w.gauges().updated.get(), 1);
    }

    #[tokio::test]
    async fn test_row_failures_are_isolated() {
        let now = Utc::now();
        let store = Arc::new(MemTxStore {
            broken_row: true,
            ..Default::default()
        });
        let failing = pending_tx("ethereum", now);
        let mut hashless = pending_tx("base", now);
        hashless.tx_hash = None;
        let fine = pending_tx("bitcoin", now);
        let fine_id = fine.id;
        store.rows.with(|r| r.extend([failing, hashless, fine]));

        let w = worker(
            store.clone(),
            vec![
                (Chain::Ethereum, FixedRpc::new(Err(AutosignError::Rpc("timeout".into())))),
                (Chain::Base, FixedRpc::new(Ok(TxOnChainStatus::Success))),
                (Chain::Bitcoin, FixedRpc::new(Ok(TxOnChainStatus::Fail))),
            ],
            Arc::new(ManualClock::new(now)),
        );
        let stats = w.tick().await.unwrap();

        assert_eq!(stats, TickStats { processed: 4, updated: 1, lost: 0, failed: 3 });
        assert_eq!(store.row(fine_id).status_onchain, Some(TxOnChainStatus::Fail));
        assert_eq!(w.gauges().failed.get(), 3);
    }

    #[tokio::test]
    async fn test_rpc_calls_bounded_by_concurrency() {
        let now = Utc::now();
        let store = Arc::new(MemTxStore::default());
        store.rows.with(|r| r.extend((0..12).map(|_| pending_tx("arbitrum", now))));
        let rpc = Arc::new(SlowRpc::default());

        let mut rpcs: HashMap<Chain, Arc<dyn RpcAdapter>> = HashMap::new();
        rpcs.insert(Chain::Arbitrum, rpc.clone());
        let opts = TxIndexerOptions {
            concurrency: 3,
            ..TxIndexerOptions::default()
        };
        let w = TxIndexerWorker::new(store, rpcs, opts).with_clock(Arc::new(ManualClock::new(now)));
        let stats = w.tick().await.unwrap();

        assert_eq!(stats.processed, 12);
        assert_eq!(rpc.in_flight.load(Ordering::SeqCst), 0);
        let peak = rpc.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight calls was {peak}");
        assert_eq!(peak, 3);
    }

    #[test]
    fn test_default_options_match_default_config() {
        let cfg = TxIndexerConfig::default();
        let from_cfg = TxIndexerOptions::from_config(&cfg).unwrap();
        let default = TxIndexerOptions::default();
        assert_eq!(from_cfg.mark_lost_after, default.mark_lost_after);
        assert_eq!(from_cfg.concurrency, default.concurrency);
        assert_eq!(from_cfg.interval, default.interval);

        let huge = TxIndexerConfig {
            mark_lost_after_secs: u64::MAX,
            ..TxIndexerConfig::default()
        };
        assert!(TxIndexerOptions::from_config(&huge).is_err());
    }
}
