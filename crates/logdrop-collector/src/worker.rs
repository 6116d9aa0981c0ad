//! The aggregation loop
//!
//! ```text
//! BOOTSTRAP -> SWEEP_CLEANUP -> CLAIM_BATCH -> APPEND_BATCH -> (SWEEP_CLEANUP ...)
//!                                                 |
//!                                              STOPPED
//! ```
//!
//! One pass of the loop is synchronous filesystem work ([`Collector::cycle`]);
//! [`Collector::run`] drives passes on the blocking pool and owns sleeping
//! and shutdown.

use crate::alert::{Alert, AlertKind};
use crate::error::{CollectorError, Result};
use crate::AlertSink;
use logdrop_core::{CollectorConfig, Day, PipelinePaths, WorkerId};
use logdrop_store::{
    sweep_stale_days, AppendError, CacheDirectory, ClaimError, LogStore, StagingArea,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Cache temp files older than this belong to a dead ingestion request
const STALE_TEMP_AGE: Duration = Duration::from_secs(3600);

/// Where a worker is in its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Bootstrap,
    SweepCleanup,
    ClaimBatch,
    AppendBatch,
    Stopped,
}

/// Outcome of one pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Staged entries carried over from the previous day's directory
    pub carried: usize,
    /// Stale staging directories removed
    pub swept: usize,
    pub claimed: usize,
    pub appended: usize,
    /// Per-entry failures; the affected entries stay staged
    pub alerts: Vec<Alert>,
    /// Nothing was claimable, so the loop should sleep before polling again
    pub idle: bool,
}

/// One aggregation worker
pub struct Collector {
    worker: WorkerId,
    cache: CacheDirectory,
    staging_root: PathBuf,
    staging: StagingArea,
    store: LogStore,
    config: CollectorConfig,
    state: WorkerState,
}

impl Collector {
    pub fn new(paths: &PipelinePaths, config: CollectorConfig, worker: WorkerId) -> Self {
        Self::starting_on(paths, config, worker, Day::today())
    }

    /// Worker whose staging directory starts out under `day`
    pub fn starting_on(
        paths: &PipelinePaths,
        config: CollectorConfig,
        worker: WorkerId,
        day: Day,
    ) -> Self {
        Self {
            worker,
            cache: CacheDirectory::new(&paths.cache_dir),
            staging_root: paths.staging_dir.clone(),
            staging: StagingArea::new(&paths.staging_dir, worker, day),
            store: LogStore::new(&paths.log_dir).with_sync(config.sync_appends),
            config,
            state: WorkerState::Bootstrap,
        }
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    fn enter(&mut self, state: WorkerState) {
        if self.state != state {
            debug!(worker = %self.worker, "{:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Run one pass against the current UTC day
    pub fn cycle(&mut self) -> Result<CycleReport> {
        self.cycle_on(Day::today())
    }

    /// Run one pass as if the UTC day were `today`
    ///
    /// An error means the cache or staging root is unreachable and the
    /// worker has stopped.
    pub fn cycle_on(&mut self, today: Day) -> Result<CycleReport> {
        let result = self.pass(today);
        if result.is_err() {
            self.enter(WorkerState::Stopped);
        }
        result
    }

    fn pass(&mut self, today: Day) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        self.enter(WorkerState::Bootstrap);
        report.carried = self.staging.roll_over(today)?;
        self.staging.ensure()?;

        self.enter(WorkerState::SweepCleanup);
        report.swept = self.sweep(today)?;

        self.enter(WorkerState::ClaimBatch);
        self.claim_batch(&mut report)?;

        self.enter(WorkerState::AppendBatch);
        self.append_batch(&mut report)?;

        if report.claimed > 0 || report.appended > 0 {
            info!(
                worker = %self.worker,
                "Claimed {} and appended {} entries",
                report.claimed,
                report.appended
            );
        }
        Ok(report)
    }

    fn sweep(&self, today: Day) -> Result<usize> {
        let swept = sweep_stale_days(&self.staging_root, today, self.config.stale_after_days)?;
        let temps = self.cache.remove_stale_temps(STALE_TEMP_AGE)?;
        if temps > 0 {
            info!("Removed {} abandoned temp files from the cache", temps);
        }
        Ok(swept.removed.len())
    }

    /// Move pending entries, oldest first, until the batch is full or a move fails
    fn claim_batch(&self, report: &mut CycleReport) -> Result<()> {
        let pending = self.cache.list()?;
        if pending.is_empty() {
            report.idle = true;
            return Ok(());
        }

        let limit = self.config.batch_size.unwrap_or(usize::MAX);
        for name in pending.iter().take(limit) {
            match self.staging.try_claim(&self.cache, name) {
                Ok(_) => report.claimed += 1,
                Err(ClaimError::AlreadyClaimed(name)) => {
                    debug!("{} was claimed by another worker", name);
                    break;
                }
                Err(ClaimError::Io { name, source }) => {
                    report.alerts.push(
                        Alert::new(AlertKind::Claim, self.worker, &source)
                            .with_path(self.cache.entry_path(&name))
                            .with_entry(&name),
                    );
                    report.idle = true;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Append everything staged, in name order; handles close when the session drops
    fn append_batch(&self, report: &mut CycleReport) -> Result<()> {
        let staged = self.staging.list()?;
        if staged.is_empty() {
            return Ok(());
        }

        let mut session = self.store.session();
        for entry in &staged {
            let content = match entry.read() {
                Ok(content) => content,
                Err(e) => {
                    report.alerts.push(
                        Alert::new(AlertKind::Read, self.worker, &e)
                            .with_entry(entry.name())
                            .with_path(entry.path()),
                    );
                    continue;
                }
            };

            if let Err(e) = session.append(&entry.name().log_name(), &content) {
                let (kind, path, source) = match e {
                    AppendError::Open { path, source } => (AlertKind::Open, path, source),
                    AppendError::Write { path, source } => (AlertKind::Write, path, source),
                };
                report.alerts.push(
                    Alert::new(kind, self.worker, &source)
                        .with_entry(entry.name())
                        .with_path(path),
                );
                continue;
            }

            if let Err(e) = entry.remove() {
                report.alerts.push(
                    Alert::new(AlertKind::Remove, self.worker, &e)
                        .with_entry(entry.name())
                        .with_path(entry.path()),
                );
                continue;
            }
            report.appended += 1;
        }
        Ok(())
    }

    /// Loop until `shutdown` turns true, reporting failures to `alerts`
    ///
    /// Shutdown is honored between passes, never inside one. Returns the
    /// fatal error if the worker had to stop on its own.
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
        alerts: Arc<dyn AlertSink>,
    ) -> Result<()> {
        let worker = self.worker;
        let interval = self.config.poll_interval();
        info!(
            "Worker {} started, staging in {}",
            worker,
            self.staging.dir().display()
        );

        let mut collector = self;
        let outcome = loop {
            if *shutdown.borrow() {
                collector.enter(WorkerState::Stopped);
                break Ok(());
            }

            let joined = tokio::task::spawn_blocking(move || {
                let result = collector.cycle();
                (collector, result)
            })
            .await;
            let (returned, result) = match joined {
                Ok(pair) => pair,
                Err(e) => break Err(CollectorError::from(e)),
            };
            collector = returned;

            let report = match result {
                Ok(report) => report,
                Err(e) => break Err(e),
            };
            for alert in &report.alerts {
                if let Err(e) = alerts.send(alert).await {
                    warn!("Failed to deliver alert ({}): {}", e, alert);
                }
            }

            if report.idle {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            // Sender gone; nobody can ask us to stop any more
                            collector.enter(WorkerState::Stopped);
                            break Ok(());
                        }
                    }
                }
            }
        };

        match &outcome {
            Ok(()) => info!("Worker {} stopped", worker),
            Err(e) => {
                let alert = Alert::new(AlertKind::Fatal, worker, e);
                if let Err(send_err) = alerts.send(&alert).await {
                    warn!("Failed to deliver alert ({}): {}", send_err, alert);
                }
            }
        }
        outcome
    }
}
