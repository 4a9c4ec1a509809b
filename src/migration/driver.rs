//! One end-to-end pass: decode -> batch -> flush, with progress.

use super::decoder::ErrorBudget;
use super::strategy::{ReadItem, RecordReader};
use crate::db::CitySink;
use crate::error::{MigrationError, MigrationResult};
use crate::progress::{ProgressSignal, blended};
use crate::types::City;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Records between progress publications during decoding.
const PUBLISH_EVERY: u64 = 256;

/// Counters for one successful pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStats {
    pub strategy: &'static str,
    pub records_decoded: u64,
    pub records_written: u64,
    pub decode_errors: u64,
    pub batches_committed: u64,
    pub elapsed: Duration,
}

/// Drives a [`RecordReader`] into a [`CitySink`].
///
/// Records are handled strictly in source order and batches are committed in
/// the order they fill up. The driver never retries; a failure ends the pass.
pub struct StreamDriver<'a> {
    batch_size: usize,
    error_ceiling: u64,
    progress: &'a ProgressSignal,
    cancel: &'a AtomicBool,
}

impl<'a> StreamDriver<'a> {
    pub fn new(
        batch_size: usize,
        error_ceiling: u64,
        progress: &'a ProgressSignal,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            batch_size: batch_size.max(1),
            error_ceiling,
            progress,
            cancel,
        }
    }

    pub fn run<S: CitySink + ?Sized>(
        &self,
        strategy: &'static str,
        reader: &mut dyn RecordReader,
        sink: &S,
    ) -> MigrationResult<MigrationStats> {
        let started = Instant::now();
        let mut budget = ErrorBudget::new(self.error_ceiling);
        let mut batch: Vec<City> = Vec::with_capacity(self.batch_size);
        let mut stats = MigrationStats {
            strategy,
            records_decoded: 0,
            records_written: 0,
            decode_errors: 0,
            batches_committed: 0,
            elapsed: Duration::ZERO,
        };
        let mut committed_fraction = 0.0;

        self.check_cancelled()?;

        while let Some(item) = reader.next_item()? {
            match item {
                ReadItem::Record(city) => {
                    stats.records_decoded += 1;
                    batch.push(city);
                }
                ReadItem::Invalid(err) => {
                    let result = budget.record(&err);
                    stats.decode_errors = budget.seen();
                    result?;
                }
            }

            if batch.len() >= self.batch_size {
                committed_fraction = reader.fraction_consumed();
                self.flush(&mut batch, &mut stats, sink)?;
                self.progress
                    .advance(blended(reader.fraction_consumed(), committed_fraction));
                self.check_cancelled()?;
            } else if (stats.records_decoded + stats.decode_errors) % PUBLISH_EVERY == 0 {
                self.progress
                    .advance(blended(reader.fraction_consumed(), committed_fraction));
            }
        }

        if stats.records_decoded == 0 && stats.decode_errors > 0 {
            return Err(MigrationError::NoRecords {
                errors: stats.decode_errors,
            });
        }

        self.flush(&mut batch, &mut stats, sink)?;
        self.progress.advance(blended(1.0, 1.0));

        stats.elapsed = started.elapsed();
        info!(
            strategy,
            records = stats.records_written,
            decode_errors = stats.decode_errors,
            batches = stats.batches_committed,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Migration pass complete"
        );
        Ok(stats)
    }

    fn flush<S: CitySink + ?Sized>(
        &self,
        batch: &mut Vec<City>,
        stats: &mut MigrationStats,
        sink: &S,
    ) -> MigrationResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let number = stats.batches_committed + 1;
        let written = sink
            .write_batch(batch)
            .map_err(|e| MigrationError::batch_commit(number, e))?;

        stats.batches_committed = number;
        stats.records_written += written as u64;
        debug!(batch = number, rows = written, total = stats.records_written, "Committed batch");
        batch.clear();
        Ok(())
    }

    fn check_cancelled(&self) -> MigrationResult<()> {
        if self.cancel.load(Ordering::Acquire) {
            return Err(MigrationError::Cancelled);
        }
        Ok(())
    }
}
