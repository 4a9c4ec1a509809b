//! Reset command: wipe migrated cities and the completion flag.

use super::{open_database, open_preferences};
use crate::config::Config;
use crate::db::{CityStore, Database};
use crate::migration::guard::IdempotencyGuard;
use crate::prefs::PreferenceStore;
use anyhow::{Context, Result};
use clap::Args;

/// Arguments for the reset command.
#[derive(Args, Debug, Default)]
pub struct ResetArgs {
    /// Reset without prompting for confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Run the reset command.
pub fn run_reset(config: &Config, args: &ResetArgs) -> Result<()> {
    let db = open_database(config)?;
    let prefs = open_preferences(config);

    // Confirm unless --yes
    if !args.yes {
        println!(
            "This will delete all cities (and favorites) from '{}' and forget that they were migrated.",
            config.database.path.display()
        );
        print!("Continue? [y/N] ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Reset cancelled.");
            return Ok(());
        }
    }

    let removed = reset_store(&db, &prefs)?;
    println!("Removed {} cities. The next 'migrate' will load them again.", removed);
    Ok(())
}

/// Clear the store, then the flag. Returns the number of removed cities.
pub fn reset_store(db: &Database, prefs: &dyn PreferenceStore) -> Result<u64> {
    let removed = db.clear_cities().context("Failed to clear cities")?;
    IdempotencyGuard::new(prefs, db).reset()?;
    tracing::info!(removed, "Reset migrated cities");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CitySink;
    use crate::prefs::MemoryPreferences;
    use crate::types::City;

    #[test]
    fn test_reset_store_clears_rows_and_flag() {
        let db = Database::open_in_memory().unwrap();
        let prefs = MemoryPreferences::new();
        db.write_batch(&[City {
            id: 1,
            name: "Quito".into(),
            country: "EC".into(),
            latitude: -0.22,
            longitude: -78.51,
        }])
        .unwrap();
        let guard = IdempotencyGuard::new(&prefs, &db);
        guard.mark_complete().unwrap();

        assert_eq!(reset_store(&db, &prefs).unwrap(), 1);
        assert_eq!(db.city_count().unwrap(), 0);
        assert!(!guard.is_complete().unwrap());
    }

    #[test]
    fn test_run_reset_with_yes() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = temp.path().join("cities.db");
        config.preferences.path = temp.path().join("prefs.json");

        run_reset(&config, &ResetArgs { yes: true }).unwrap();
        assert!(config.database.path.exists());
    }
}
