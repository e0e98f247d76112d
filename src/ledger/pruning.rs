//! Retention sweeper
//!
//! Deletes ledger rows older than the retention window together with every
//! row sharing their sequence index. Each row's delete-set is one atomic
//! batch; the loop yields between batches so ingestion and shutdown are never
//! starved.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::{LedgerError, Result};
use super::keys::{decode_ledger_record, ledger_range_until};
use super::sequence::{SequenceGenerator, SequenceIndex};
use super::store::{LedgerStore, WriteOp};
use crate::observability::Metrics;

pub const DEFAULT_MIN_WINDOW: Duration = Duration::from_secs(10);
pub const DEFAULT_BATCH_LIMIT: usize = 1000;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(1);

/// Retention settings consumed by the sweeper
#[derive(Debug, Clone, Builder)]
pub struct RetentionPolicy {
    /// How long rows are kept
    pub retention: Duration,
    /// Rows younger than this are never eligible, whatever `retention` says
    #[builder(default = DEFAULT_MIN_WINDOW)]
    pub min_window: Duration,
    /// Ledger rows read per scanning pass
    #[builder(default = DEFAULT_BATCH_LIMIT)]
    pub batch_limit: usize,
    #[builder(default = DEFAULT_SWEEP_INTERVAL)]
    pub interval: Duration,
    #[builder(default = DEFAULT_STARTUP_DELAY)]
    pub startup_delay: Duration,
}

impl RetentionPolicy {
    /// Exclusive upper bound of the rows that may be deleted at `now`
    pub fn cutoff(&self, sequence: &SequenceGenerator, now: DateTime<Utc>) -> SequenceIndex {
        let window = self.retention.max(self.min_window);
        let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
        let horizon = now.checked_sub_signed(window).unwrap_or_default();
        sequence.bound_for(horizon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    Idle,
    Scanning,
    Deleting,
    Closing,
}

impl fmt::Display for SweepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SweepPhase::Idle => "idle",
            SweepPhase::Scanning => "scanning",
            SweepPhase::Deleting => "deleting",
            SweepPhase::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Outcome of one triggered sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Scanning passes that found at least one row
    pub passes: usize,
    /// Ledger rows removed
    pub records: usize,
    /// Keys removed, ledger rows included
    pub rows: usize,
    /// Shutdown stopped the sweep before it caught up
    pub interrupted: bool,
}

pub struct RetentionSweeper {
    store: LedgerStore,
    policy: RetentionPolicy,
    metrics: Arc<Metrics>,
    phase: watch::Sender<SweepPhase>,
}

impl RetentionSweeper {
    pub fn new(store: LedgerStore, policy: RetentionPolicy, metrics: Arc<Metrics>) -> Self {
        let (phase, _) = watch::channel(SweepPhase::Idle);
        Self {
            store,
            policy,
            metrics,
            phase,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SweepPhase> {
        self.phase.subscribe()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Sweep once after the startup delay, then once per interval, until the
    /// store's shutdown token fires
    pub async fn run(self) {
        let shutdown = self.store.shutdown_token();
        info!(
            retention_secs = self.policy.retention.as_secs(),
            interval_secs = self.policy.interval.as_secs(),
            batch_limit = self.policy.batch_limit,
            "Retention sweeper started"
        );

        let mut delay = self.policy.startup_delay;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            match self.sweep(Utc::now()).await {
                Ok(report) if report.records > 0 => {
                    info!(
                        records = report.records,
                        rows = report.rows,
                        passes = report.passes,
                        interrupted = report.interrupted,
                        "Cleared expired keys"
                    );
                }
                Ok(_) => debug!("Nothing to expire"),
                Err(err) => error!(error = %err, "Error while removing old keys"),
            }

            delay = self.policy.interval;
        }

        self.phase.send_replace(SweepPhase::Closing);
        info!("Retention sweeper stopped");
    }

    /// Delete everything that is out of the retention window at `now`
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let cutoff = self.policy.cutoff(self.store.sequence(), now);
        self.sweep_until(&cutoff).await
    }

    /// Delete every ledger row below `cutoff` and its correlated rows
    ///
    /// Runs capped passes back to back until a pass comes up short. Returns
    /// early with `interrupted` set when shutdown starts; any store error
    /// aborts the sweep.
    pub async fn sweep_until(&self, cutoff: &SequenceIndex) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let result = self.sweep_passes(cutoff, &mut report).await;

        let phase = if self.store.is_closing() {
            SweepPhase::Closing
        } else {
            SweepPhase::Idle
        };
        self.phase.send_replace(phase);
        self.metrics.rows_swept(report.rows as u64);

        match result {
            Ok(()) => Ok(report),
            Err(err) => {
                warn!(
                    records = report.records,
                    error = %err,
                    "Sweep aborted"
                );
                Err(err)
            }
        }
    }

    async fn sweep_passes(&self, cutoff: &SequenceIndex, report: &mut SweepReport) -> Result<()> {
        let shutdown = self.store.shutdown_token();

        loop {
            if shutdown.is_cancelled() {
                report.interrupted = true;
                return Ok(());
            }

            self.phase.send_replace(SweepPhase::Scanning);
            let delete_sets = match self.scan_pass(cutoff) {
                Ok(sets) => sets,
                Err(LedgerError::Closing) => {
                    report.interrupted = true;
                    return Ok(());
                }
                Err(err) => return Err(err),
            };
            if delete_sets.is_empty() {
                return Ok(());
            }

            let caught_up = delete_sets.len() < self.policy.batch_limit;
            report.passes += 1;
            info!(count = delete_sets.len(), %cutoff, "Clearing batch");

            self.phase.send_replace(SweepPhase::Deleting);
            for keys in delete_sets {
                if shutdown.is_cancelled() {
                    report.interrupted = true;
                    return Ok(());
                }

                let rows = keys.len();
                match self
                    .store
                    .apply(keys.into_iter().map(WriteOp::Delete).collect())
                {
                    Ok(()) => {}
                    Err(LedgerError::Closing) => {
                        report.interrupted = true;
                        return Ok(());
                    }
                    Err(err) => return Err(err),
                }
                report.records += 1;
                report.rows += rows;

                tokio::task::yield_now().await;
            }

            if caught_up {
                return Ok(());
            }
        }
    }

    /// Read up to `batch_limit` expired ledger rows and expand each into the
    /// keys that must go with it
    fn scan_pass(&self, cutoff: &SequenceIndex) -> Result<Vec<Vec<Vec<u8>>>> {
        let mut delete_sets = Vec::new();

        for item in self
            .store
            .scan(ledger_range_until(cutoff), Some(self.policy.batch_limit))
        {
            let (key, value) = item?;
            match decode_ledger_record(&key, &value) {
                Some(record) => delete_sets.push(record.delete_set()),
                None => {
                    // Without a parsable record the correlated rows are unknown
                    warn!(
                        key = %String::from_utf8_lossy(&key),
                        "Dropping malformed ledger row"
                    );
                    delete_sets.push(vec![key.to_vec()]);
                }
            }
        }

        Ok(delete_sets)
    }
}
