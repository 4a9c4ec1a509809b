//! Migrate command: load the bundled city list into the local store.

use super::{open_database, open_preferences};
use crate::config::{Config, MigrationConfig};
use crate::db::CityStore;
use crate::migration::{MigrationReport, MigrationStatus, Migrator};
use crate::progress::ProgressSignal;
use crate::source::FileAsset;
use anyhow::Result;
use clap::Args;
use std::io::Write;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Arguments for the migrate command.
#[derive(Args, Debug, Default)]
pub struct MigrateArgs {
    /// Source asset (overrides config)
    #[arg(short, long)]
    pub source: Option<String>,

    /// Rows per write transaction (overrides config)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Malformed records tolerated per strategy (overrides config)
    #[arg(long)]
    pub error_ceiling: Option<u64>,

    /// Stop progress at 90% until the data has been reported, then finalize.
    #[arg(long)]
    pub hold_final_step: bool,
}

impl MigrateArgs {
    /// Apply command-line overrides to the migration config.
    pub fn apply(&self, config: &mut MigrationConfig) {
        if let Some(source) = &self.source {
            config.source_path = source.into();
        }
        if let Some(size) = self.batch_size {
            config.batch_size = size;
        }
        if let Some(ceiling) = self.error_ceiling {
            config.error_ceiling = ceiling;
        }
        if self.hold_final_step {
            config.auto_finalize = false;
        }
    }
}

/// Run the migrate command. The report tells the caller whether it failed.
pub async fn run_migrate(config: &Config, args: &MigrateArgs) -> Result<MigrationReport> {
    let mut migration = config.migration.clone();
    args.apply(&mut migration);
    migration.validate()?;

    let db = Arc::new(open_database(config)?);
    let prefs = Arc::new(open_preferences(config));
    let source = Arc::new(FileAsset::new(&migration.source_path));
    let hold = !migration.auto_finalize;

    let migrator = Migrator::new(db.clone(), prefs, source, migration);
    let printer = spawn_progress_printer(migrator.progress().clone());

    let report = migrator.migrate_if_needed().await;

    if hold && report.status == MigrationStatus::Migrated {
        // The store is ready; report it before releasing the last step.
        match db.city_count() {
            Ok(count) => println!("\nStored cities: {}", count),
            Err(e) => tracing::warn!("Failed to count cities: {:#}", e),
        }
        migrator.finalize_progress();
    }

    // Let the printer observe the final snapshot.
    tokio::task::yield_now().await;
    printer.abort();

    let snapshot = migrator.progress().snapshot();
    println!("\rProgress: {:5.1}%", snapshot.value);
    print_summary(&report);
    Ok(report)
}

fn spawn_progress_printer(progress: Arc<ProgressSignal>) -> JoinHandle<()> {
    let mut rx = progress.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let snapshot = *rx.borrow_and_update();
            print!("\rProgress: {:5.1}%", snapshot.value);
            let _ = std::io::stdout().flush();
        }
    })
}

fn print_summary(report: &MigrationReport) {
    match report.status {
        MigrationStatus::AlreadyMigrated => {
            println!("Cities already migrated, nothing to do.");
        }
        MigrationStatus::Migrated => {
            if let Some(stats) = &report.stats {
                println!(
                    "Migrated {} cities using the '{}' strategy ({} batches, {} skipped records, {:.2}s).",
                    stats.records_written,
                    stats.strategy,
                    stats.batches_committed,
                    stats.decode_errors,
                    stats.elapsed.as_secs_f64()
                );
            }
        }
        MigrationStatus::Failed => {
            println!("Migration failed.");
            if let Some(error) = &report.error {
                println!("  Error: {}", error);
            }
        }
    }

    if !report.attempts.is_empty() {
        println!("Failed attempts:");
        for attempt in &report.attempts {
            println!("  {}: {}", attempt.strategy, attempt.message);
        }
    }
}
