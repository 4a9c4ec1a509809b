//! CLI command definitions for city-loader
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod migrate;
pub mod reset;
pub mod search;
pub mod status;

use crate::config::Config;
use crate::db::Database;
use crate::prefs::FilePreferences;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use migrate::MigrateArgs;
use reset::ResetArgs;
use search::{FavoriteArgs, SearchArgs};

/// Bundled city list loader
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Path to preferences file (overrides config)
    #[arg(short, long, global = true)]
    pub prefs: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the bundled city list unless it has been loaded already
    Migrate(MigrateArgs),

    /// Show the completion flag and the number of stored cities
    Status,

    /// Delete all cities and forget the completion flag
    Reset(ResetArgs),

    /// Find cities by name prefix
    Search(SearchArgs),

    /// Add or remove a favorite city
    Favorite(FavoriteArgs),
}

impl Cli {
    /// Resolve configuration: file (explicit or default), environment, then
    /// command-line overrides.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let mut config = Config::load(path)?;
                config.apply_env_overrides();
                config
            }
            None => Config::load_or_default(),
        };

        if let Some(db_path) = &self.database {
            config.database.path = db_path.into();
        }
        if let Some(prefs_path) = &self.prefs {
            config.preferences.path = prefs_path.into();
        }
        Ok(config)
    }
}

pub(crate) fn open_database(config: &Config) -> Result<Database> {
    Database::open(&config.database.path)
        .with_context(|| format!("Failed to open database {:?}", config.database.path))
}

pub(crate) fn open_preferences(config: &Config) -> FilePreferences {
    FilePreferences::new(&config.preferences.path)
}
