//! City table: batch writes, counts and lookups.

use super::Database;
use crate::types::City;
use anyhow::{Context, Result};
use rusqlite::{Row, params};

const UPSERT_CITY: &str = "INSERT INTO cities (id, name, country, latitude, longitude)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT(id) DO UPDATE SET
         name = excluded.name,
         country = excluded.country,
         latitude = excluded.latitude,
         longitude = excluded.longitude";

/// Destination for committed batches.
///
/// A call either commits every row of `rows` or none of them.
pub trait CitySink: Send + Sync {
    fn write_batch(&self, rows: &[City]) -> Result<usize>;
}

/// Store operations the migration needs beyond writing batches.
pub trait CityStore: CitySink {
    fn city_count(&self) -> Result<u64>;

    /// Delete every city. Returns the number of rows removed.
    fn clear_cities(&self) -> Result<u64>;
}

impl CitySink for Database {
    fn write_batch(&self, rows: &[City]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        self.with_conn_mut(|conn| {
            // Dropping the transaction without commit rolls the batch back
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(UPSERT_CITY)?;
                for city in rows {
                    stmt.execute(params![
                        city.id,
                        city.name,
                        city.country,
                        city.latitude,
                        city.longitude
                    ])
                    .with_context(|| format!("Failed to insert city {}", city.id))?;
                }
            }
            tx.commit()?;
            Ok(rows.len())
        })
    }
}

impl CityStore for Database {
    fn city_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM cities", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    fn clear_cities(&self) -> Result<u64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM favorites", [])?;
            let deleted = tx.execute("DELETE FROM cities", [])?;
            tx.commit()?;
            Ok(deleted as u64)
        })
    }
}

fn row_to_city(row: &Row) -> rusqlite::Result<City> {
    Ok(City {
        id: row.get("id")?,
        name: row.get("name")?,
        country: row.get("country")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
    })
}

/// Escape LIKE wildcards so user input matches literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl Database {
    /// Get a city by id.
    pub fn get_city(&self, id: i64) -> Result<Option<City>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, country, latitude, longitude FROM cities WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_city(row)?)),
                None => Ok(None),
            }
        })
    }

    /// Search cities whose name starts with `prefix` (ASCII case-insensitive),
    /// ordered by name then country.
    pub fn search_cities(&self, prefix: &str, limit: usize, offset: usize) -> Result<Vec<City>> {
        let pattern = format!("{}%", escape_like(prefix.trim()));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, country, latitude, longitude FROM cities
                 WHERE name LIKE ?1 ESCAPE '\\'
                 ORDER BY name COLLATE NOCASE, country, id
                 LIMIT ?2 OFFSET ?3",
            )?;
            let cities = stmt
                .query_map(params![pattern, limit as i64, offset as i64], row_to_city)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(cities)
        })
    }
}
