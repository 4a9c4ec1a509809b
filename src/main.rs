//! City Loader
//!
//! Loads the bundled city list into the local store once, then answers
//! queries against it.

use anyhow::Result;
use city_loader::cli::{Cli, Command, migrate, reset, search, status};
use city_loader::logging::{self, LogTarget};
use clap::Parser;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on --log option
    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let config = cli.load_config()?;
    debug!(
        database = %config.database.path.display(),
        preferences = %config.preferences.path.display(),
        source = %config.migration.source_path.display(),
        "Configuration loaded"
    );

    match &cli.command {
        Command::Migrate(args) => {
            let report = migrate::run_migrate(&config, args).await?;
            if !report.is_success() {
                std::process::exit(1);
            }
        }
        Command::Status => status::run_status(&config)?,
        Command::Reset(args) => reset::run_reset(&config, args)?,
        Command::Search(args) => search::run_search(&config, args)?,
        Command::Favorite(args) => search::run_favorite(&config, args)?,
    }

    Ok(())
}
