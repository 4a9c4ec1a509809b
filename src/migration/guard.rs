//! Idempotency guard: decides whether a migration still needs to run.

use crate::db::CityStore;
use crate::error::{MigrationError, MigrationResult};
use crate::prefs::PreferenceStore;
use serde_json::Value;
use tracing::{debug, warn};

/// Preference key of the completion flag.
pub const COMPLETION_FLAG_KEY: &str = "cities_migrated";
/// Preference key recording when the flag was set (RFC 3339).
pub const COMPLETED_AT_KEY: &str = "cities_migrated_at";
/// Preference key set when rows from a failed run could not be cleared.
pub const DIRTY_KEY: &str = "cities_migration_dirty";

/// Outcome of [`IdempotencyGuard::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Data is already present. `repaired` is set when the flag was missing
    /// and has just been written based on the row count.
    AlreadyMigrated { repaired: bool },
    /// `dirty` is set when the store still holds rows from a failed run and
    /// must be cleared before loading.
    NeedsMigration { dirty: bool },
}

pub struct IdempotencyGuard<'a> {
    prefs: &'a dyn PreferenceStore,
    store: &'a dyn CityStore,
}

impl<'a> IdempotencyGuard<'a> {
    pub fn new(prefs: &'a dyn PreferenceStore, store: &'a dyn CityStore) -> Self {
        Self { prefs, store }
    }

    /// Check the flag first, then the row count.
    ///
    /// Rows without a flag mean an earlier run wrote data but stopped before
    /// marking completion; that is treated as migrated and the flag is set.
    /// Rows left behind by a failed run whose cleanup also failed are never
    /// repaired into a completed migration.
    pub fn check(&self) -> MigrationResult<GuardDecision> {
        if self.is_complete()? {
            debug!("Completion flag set, skipping migration");
            return Ok(GuardDecision::AlreadyMigrated { repaired: false });
        }

        if self.is_dirty()? {
            warn!("Store holds rows from a failed migration, reloading");
            return Ok(GuardDecision::NeedsMigration { dirty: true });
        }

        let rows = self.store.city_count().map_err(MigrationError::store)?;
        if rows > 0 {
            warn!(rows, "Found migrated rows without completion flag, repairing flag");
            self.mark_complete()?;
            return Ok(GuardDecision::AlreadyMigrated { repaired: true });
        }

        Ok(GuardDecision::NeedsMigration { dirty: false })
    }

    pub fn is_complete(&self) -> MigrationResult<bool> {
        self.prefs
            .get_bool(COMPLETION_FLAG_KEY)
            .map_err(MigrationError::preferences)
    }

    pub fn mark_complete(&self) -> MigrationResult<()> {
        self.prefs
            .set_bool(COMPLETION_FLAG_KEY, true)
            .and_then(|_| {
                self.prefs.set(
                    COMPLETED_AT_KEY,
                    Value::String(chrono::Utc::now().to_rfc3339()),
                )
            })
            .map_err(MigrationError::preferences)
    }

    pub fn is_dirty(&self) -> MigrationResult<bool> {
        self.prefs
            .get_bool(DIRTY_KEY)
            .map_err(MigrationError::preferences)
    }

    pub fn mark_dirty(&self) -> MigrationResult<()> {
        self.prefs
            .set_bool(DIRTY_KEY, true)
            .map_err(MigrationError::preferences)
    }

    pub fn clear_dirty(&self) -> MigrationResult<()> {
        self.prefs
            .remove(DIRTY_KEY)
            .map_err(MigrationError::preferences)
    }

    /// Forget completion. Only for wiping local state entirely.
    pub fn reset(&self) -> MigrationResult<()> {
        self.prefs
            .remove(COMPLETION_FLAG_KEY)
            .and_then(|_| self.prefs.remove(COMPLETED_AT_KEY))
            .and_then(|_| self.prefs.remove(DIRTY_KEY))
            .map_err(MigrationError::preferences)
    }
}
