//! Search and favorite commands over the migrated cities.

use super::open_database;
use crate::config::Config;
use crate::db::Database;
use crate::types::City;
use anyhow::{Result, bail};
use clap::Args;

/// Arguments for the search command.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Name prefix (case-insensitive). Ignored with --favorites.
    #[arg(default_value = "")]
    pub prefix: String,

    /// Maximum number of results
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Number of results to skip
    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// List favorite cities instead of searching
    #[arg(long)]
    pub favorites: bool,
}

/// Arguments for the favorite command.
#[derive(Args, Debug)]
pub struct FavoriteArgs {
    /// City id
    pub id: i64,

    /// Remove from favorites instead of adding
    #[arg(long)]
    pub remove: bool,
}

/// Run the search command.
pub fn run_search(config: &Config, args: &SearchArgs) -> Result<()> {
    let db = open_database(config)?;
    let cities = find(&db, args)?;

    if cities.is_empty() {
        println!("No cities found.");
        return Ok(());
    }

    for city in &cities {
        let marker = if db.is_favorite(city.id)? { "*" } else { " " };
        println!("{} {}", marker, format_city(city));
    }
    Ok(())
}

fn find(db: &Database, args: &SearchArgs) -> Result<Vec<City>> {
    if args.favorites {
        return Ok(db
            .list_favorites()?
            .into_iter()
            .skip(args.offset)
            .take(args.limit)
            .collect());
    }
    if args.prefix.trim().is_empty() {
        bail!("A name prefix is required (or use --favorites)");
    }
    db.search_cities(&args.prefix, args.limit, args.offset)
}

/// Run the favorite command.
pub fn run_favorite(config: &Config, args: &FavoriteArgs) -> Result<()> {
    let db = open_database(config)?;
    let Some(city) = db.get_city(args.id)? else {
        bail!("City not found: {}", args.id);
    };

    db.set_favorite(city.id, !args.remove)?;
    if args.remove {
        println!("Removed from favorites: {}", format_city(&city));
    } else {
        println!("Added to favorites: {}", format_city(&city));
    }
    Ok(())
}

fn format_city(city: &City) -> String {
    format!(
        "{:>9}  {}, {}  ({:.4}, {:.4})",
        city.id, city.name, city.country, city.latitude, city.longitude
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CitySink;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        let rows: Vec<City> = [(1, "Paris", "FR"), (2, "Parma", "IT"), (3, "Rome", "IT")]
            .into_iter()
            .map(|(id, name, country)| City {
                id,
                name: name.into(),
                country: country.into(),
                latitude: 45.0,
                longitude: 10.0,
            })
            .collect();
        db.write_batch(&rows).unwrap();
        db
    }

    fn args(prefix: &str, favorites: bool) -> SearchArgs {
        SearchArgs {
            prefix: prefix.into(),
            limit: 20,
            offset: 0,
            favorites,
        }
    }

    #[test]
    fn test_find_by_prefix() {
        let db = seeded();
        let ids: Vec<i64> = find(&db, &args("par", false))
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_find_requires_prefix() {
        let db = seeded();
        assert!(find(&db, &args("  ", false)).is_err());
    }

    #[test]
    fn test_find_favorites() {
        let db = seeded();
        db.set_favorite(3, true).unwrap();
        let found = find(&db, &args("", true)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Rome");
    }

    #[test]
    fn test_format_city() {
        let city = City {
            id: 7,
            name: "Bern".into(),
            country: "CH".into(),
            latitude: 46.948,
            longitude: 7.4474,
        };
        assert_eq!(format_city(&city), "        7  Bern, CH  (46.9480, 7.4474)");
    }
}
