//! One-time migration of the bundled city list into the local store.
//!
//! [`Migrator`] ties the pieces together:
//!
//! 1. [`guard::IdempotencyGuard`] decides whether anything needs doing.
//! 2. Each [`strategy::MigrationStrategy`] is tried in order. A strategy's
//!    reader is fed through [`driver::StreamDriver`] into the store.
//! 3. A recoverable failure clears the store and moves on to the next
//!    strategy. A fatal one ends the chain.
//! 4. On success the completion flag is written and progress reaches 90, or
//!    100 when `auto_finalize` is set.

pub mod decoder;
pub mod driver;
pub mod guard;
pub mod scanner;
pub mod strategy;

use crate::config::MigrationConfig;
use crate::db::CityStore;
use crate::error::{ErrorCode, MigrationError, MigrationResult};
use crate::prefs::PreferenceStore;
use crate::progress::{COMPLETE, ProgressSignal};
use crate::source::SourceAsset;
use driver::{MigrationStats, StreamDriver};
use guard::{GuardDecision, IdempotencyGuard};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use strategy::{MigrationStrategy, default_strategies};
use tracing::{error, info, warn};

/// Final state of a [`Migrator::migrate_if_needed`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Nothing to do: the store was already populated.
    AlreadyMigrated,
    /// A strategy succeeded during this call.
    Migrated,
    Failed,
}

/// A strategy that was tried and failed.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyAttempt {
    pub strategy: &'static str,
    pub code: ErrorCode,
    pub message: String,
}

/// Summary of one migrate-if-needed call.
#[derive(Debug)]
pub struct MigrationReport {
    pub status: MigrationStatus,
    /// Stats of the winning pass, when one ran.
    pub stats: Option<MigrationStats>,
    /// Failed attempts, in the order they were tried.
    pub attempts: Vec<StrategyAttempt>,
    /// Why the call failed, when it did.
    pub error: Option<MigrationError>,
}

impl MigrationReport {
    fn already_migrated() -> Self {
        Self {
            status: MigrationStatus::AlreadyMigrated,
            stats: None,
            attempts: Vec::new(),
            error: None,
        }
    }

    fn migrated(stats: MigrationStats, attempts: Vec<StrategyAttempt>) -> Self {
        Self {
            status: MigrationStatus::Migrated,
            stats: Some(stats),
            attempts,
            error: None,
        }
    }

    fn failed(error: MigrationError, attempts: Vec<StrategyAttempt>) -> Self {
        Self {
            status: MigrationStatus::Failed,
            stats: None,
            attempts,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status != MigrationStatus::Failed
    }

    /// Name of the strategy that populated the store during this call.
    pub fn strategy(&self) -> Option<&'static str> {
        self.stats.as_ref().map(|s| s.strategy)
    }
}

enum RunOutcome {
    Succeeded(MigrationStats),
    Recoverable(MigrationError),
    Fatal(MigrationError),
}

/// Cancellation state of a single migrate call, shared between the caller
/// and its worker.
///
/// Once the worker starts committing completion a cancel no longer takes
/// effect, and the caller waits for the real outcome instead.
#[derive(Debug, Default)]
struct CallToken {
    cancelled: AtomicBool,
    committing: AtomicBool,
}

impl CallToken {
    /// Returns `false` when the worker was already committing.
    fn cancel(&self) -> bool {
        self.cancelled.store(true, Ordering::SeqCst);
        !self.committing.load(Ordering::SeqCst)
    }

    /// Returns `false` when the call was cancelled first.
    fn begin_commit(&self) -> bool {
        self.committing.store(true, Ordering::SeqCst);
        !self.cancelled.load(Ordering::SeqCst)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Runs the migration at most once per store.
///
/// Cloning is cheap and clones share the store, progress signal and run
/// lock, so concurrent calls on clones are serialized. Each call carries its
/// own cancellation.
#[derive(Clone)]
pub struct Migrator {
    store: Arc<dyn CityStore>,
    prefs: Arc<dyn PreferenceStore>,
    source: Arc<dyn SourceAsset>,
    progress: Arc<ProgressSignal>,
    strategies: Vec<Arc<dyn MigrationStrategy>>,
    config: MigrationConfig,
    active: Arc<Mutex<Option<Arc<CallToken>>>>,
    run_lock: Arc<Mutex<()>>,
}

impl Migrator {
    pub fn new(
        store: Arc<dyn CityStore>,
        prefs: Arc<dyn PreferenceStore>,
        source: Arc<dyn SourceAsset>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            store,
            prefs,
            source,
            progress: Arc::new(ProgressSignal::new()),
            strategies: default_strategies(),
            config,
            active: Arc::new(Mutex::new(None)),
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Publish progress on a signal owned by the caller.
    pub fn with_progress(mut self, progress: Arc<ProgressSignal>) -> Self {
        self.progress = progress;
        self
    }

    /// Replace the strategy chain. Order is preference order.
    pub fn with_strategies(mut self, strategies: Vec<Arc<dyn MigrationStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn progress(&self) -> &Arc<ProgressSignal> {
        &self.progress
    }

    /// Ask the running migration to stop at the next batch boundary.
    /// Calls still waiting for the run lock are not affected.
    pub fn cancel(&self) {
        let active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(token) = active.as_ref() {
            token.cancel();
        }
    }

    /// Final 90 -> 100 step, for callers running with `auto_finalize` off.
    pub fn finalize_progress(&self) {
        self.progress.force_set(COMPLETE, false);
    }

    pub fn is_migrated(&self) -> MigrationResult<bool> {
        IdempotencyGuard::new(self.prefs.as_ref(), self.store.as_ref()).is_complete()
    }

    /// Run the migration on a blocking worker if it has not completed yet.
    ///
    /// Never panics: every failure, including a worker panic or the
    /// configured timeout, is reported through the returned
    /// [`MigrationReport`].
    pub async fn migrate_if_needed(&self) -> MigrationReport {
        let token = Arc::new(CallToken::default());
        let worker = self.clone();
        let worker_token = token.clone();
        let mut handle =
            tokio::task::spawn_blocking(move || worker.run_call(worker_token));

        let joined = match self.config.timeout() {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) if token.cancel() => {
                    error!(
                        timeout_secs = limit.as_secs(),
                        "Migration timed out, cancelling worker"
                    );
                    self.progress.stop();
                    return MigrationReport::failed(
                        MigrationError::TimedOut(limit.as_secs()),
                        Vec::new(),
                    );
                }
                Err(_) => {
                    info!(
                        timeout_secs = limit.as_secs(),
                        "Migration timed out while recording completion, waiting"
                    );
                    handle.await
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(report) => report,
            Err(e) => {
                error!("Migration worker failed: {}", e);
                self.progress.stop();
                MigrationReport::failed(MigrationError::WorkerFailed(e.to_string()), Vec::new())
            }
        }
    }

    /// Synchronous form of [`migrate_if_needed`](Self::migrate_if_needed),
    /// without the timeout.
    pub fn migrate_if_needed_blocking(&self) -> MigrationReport {
        self.run_call(Arc::new(CallToken::default()))
    }

    fn run_call(&self, token: Arc<CallToken>) -> MigrationReport {
        // Poisoned only if an earlier run panicked between batches.
        let _running = self
            .run_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if token.is_cancelled() {
            info!("Migration call cancelled before it started");
            return MigrationReport::failed(MigrationError::Cancelled, Vec::new());
        }

        self.set_active(Some(token.clone()));
        let report = self.run_locked(&token);
        self.set_active(None);
        report
    }

    fn set_active(&self, token: Option<Arc<CallToken>>) {
        *self.active.lock().unwrap_or_else(|p| p.into_inner()) = token;
    }

    fn run_locked(&self, token: &CallToken) -> MigrationReport {
        let guard = IdempotencyGuard::new(self.prefs.as_ref(), self.store.as_ref());
        let dirty = match guard.check() {
            Ok(GuardDecision::AlreadyMigrated { repaired }) => {
                info!(repaired, "Cities already migrated");
                self.progress.force_set(COMPLETE, false);
                return MigrationReport::already_migrated();
            }
            Ok(GuardDecision::NeedsMigration { dirty }) => dirty,
            Err(e) => {
                error!("Migration check failed: {}", e);
                self.progress.stop();
                return MigrationReport::failed(e, Vec::new());
            }
        };

        info!(
            source = self.source.name(),
            strategies = self.strategies.len(),
            "Starting city migration"
        );
        self.progress.reset();

        if dirty {
            if let Err(e) = self.clear_store(&guard) {
                return self.fail(e, Vec::new());
            }
            if let Err(e) = guard.clear_dirty() {
                return self.fail(e, Vec::new());
            }
        }

        let mut attempts = Vec::new();
        for (index, strategy) in self.strategies.iter().enumerate() {
            if index > 0 {
                // Rows from a failed attempt must not leak into the next one.
                if let Err(e) = self.clear_store(&guard) {
                    return self.fail(e, attempts);
                }
            }

            match self.run_strategy(strategy.as_ref(), token) {
                RunOutcome::Succeeded(stats) => {
                    if let Err(e) = guard.mark_complete() {
                        // Rows are committed; the guard repairs the flag from
                        // the row count on the next launch.
                        warn!("Failed to record migration completion: {}", e);
                    }
                    if self.config.auto_finalize {
                        self.finalize_progress();
                    } else {
                        self.progress.stop();
                    }
                    info!(
                        strategy = stats.strategy,
                        records = stats.records_written,
                        failed_attempts = attempts.len(),
                        "City migration complete"
                    );
                    return MigrationReport::migrated(stats, attempts);
                }
                RunOutcome::Recoverable(e) => {
                    warn!(strategy = strategy.name(), code = ?e.code(), "Strategy failed: {}", e);
                    attempts.push(StrategyAttempt {
                        strategy: strategy.name(),
                        code: e.code(),
                        message: e.to_string(),
                    });
                }
                RunOutcome::Fatal(e) => {
                    error!(strategy = strategy.name(), code = ?e.code(), "Migration aborted: {}", e);
                    attempts.push(StrategyAttempt {
                        strategy: strategy.name(),
                        code: e.code(),
                        message: e.to_string(),
                    });
                    if let Err(clear_err) = self.clear_store(&guard) {
                        return self.fail(clear_err, attempts);
                    }
                    return self.fail(e, attempts);
                }
            }
        }

        if let Err(e) = self.clear_store(&guard) {
            return self.fail(e, attempts);
        }
        let error = MigrationError::Exhausted(attempts.len());
        error!("{}", error);
        self.fail(error, attempts)
    }

    fn run_strategy(&self, strategy: &dyn MigrationStrategy, token: &CallToken) -> RunOutcome {
        info!(strategy = strategy.name(), "Trying migration strategy");

        let result = strategy.open(self.source.as_ref()).and_then(|mut reader| {
            StreamDriver::new(
                self.config.batch_size,
                self.config.error_ceiling,
                &self.progress,
                &token.cancelled,
            )
            .run(strategy.name(), reader.as_mut(), self.store.as_ref())
        });

        match result {
            Ok(stats) => {
                // A cancel may land between the last batch and this point.
                if token.begin_commit() {
                    RunOutcome::Succeeded(stats)
                } else {
                    RunOutcome::Fatal(MigrationError::Cancelled)
                }
            }
            Err(e) if e.is_fatal() => RunOutcome::Fatal(e),
            Err(e) => RunOutcome::Recoverable(e),
        }
    }

    /// Remove rows from a failed attempt. When that fails the store is
    /// marked dirty so that a later check does not take the leftovers for a
    /// completed migration.
    fn clear_store(&self, guard: &IdempotencyGuard<'_>) -> MigrationResult<()> {
        match self.store.clear_cities() {
            Ok(removed) => {
                if removed > 0 {
                    info!(removed, "Cleared partially migrated rows");
                }
                Ok(())
            }
            Err(e) => {
                let err = MigrationError::store(e);
                error!("Failed to clear partially migrated rows: {}", err);
                if let Err(mark_err) = guard.mark_dirty() {
                    error!("Failed to mark store dirty: {}", mark_err);
                }
                Err(err)
            }
        }
    }

    fn fail(&self, error: MigrationError, attempts: Vec<StrategyAttempt>) -> MigrationReport {
        self.progress.stop();
        MigrationReport::failed(error, attempts)
    }
}
