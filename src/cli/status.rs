//! Status command.

use super::{open_database, open_preferences};
use crate::config::Config;
use crate::db::CityStore;
use crate::migration::guard::{COMPLETED_AT_KEY, IdempotencyGuard};
use crate::prefs::PreferenceStore;
use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Serialize, PartialEq)]
pub struct Status {
    pub migrated: bool,
    pub migrated_at: Option<String>,
    pub cities: u64,
}

/// Read the flag, its timestamp and the row count.
pub fn read_status(store: &dyn CityStore, prefs: &dyn PreferenceStore) -> Result<Status> {
    let migrated = IdempotencyGuard::new(prefs, store).is_complete()?;
    let migrated_at = prefs
        .get(COMPLETED_AT_KEY)?
        .and_then(|v| v.as_str().map(str::to_string));
    let cities = store.city_count()?;
    Ok(Status {
        migrated,
        migrated_at,
        cities,
    })
}

/// Run the status command.
pub fn run_status(config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let prefs = open_preferences(config);
    let status = read_status(&db, &prefs)?;

    println!("Database:    {}", config.database.path.display());
    println!("Preferences: {}", config.preferences.path.display());
    match &status.migrated_at {
        Some(at) => println!("Migrated:    {} ({})", status.migrated, at),
        None => println!("Migrated:    {}", status.migrated),
    }
    println!("Cities:      {}", status.cities);

    if !status.migrated && status.cities > 0 {
        println!("Note: rows present without completion flag; the next 'migrate' will repair it.");
    }
    Ok(())
}
