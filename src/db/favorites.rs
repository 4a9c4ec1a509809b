//! Favorite cities.

use super::{Database, now_ms};
use crate::types::City;
use anyhow::{Result, anyhow};
use rusqlite::params;

impl Database {
    /// Mark or unmark a city as favorite. Returns the new state.
    pub fn set_favorite(&self, city_id: i64, favorite: bool) -> Result<bool> {
        self.with_conn(|conn| {
            if favorite {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cities WHERE id = ?1)",
                    params![city_id],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(anyhow!("City not found: {}", city_id));
                }
                conn.execute(
                    "INSERT OR IGNORE INTO favorites (city_id, created_at) VALUES (?1, ?2)",
                    params![city_id, now_ms()],
                )?;
            } else {
                conn.execute("DELETE FROM favorites WHERE city_id = ?1", params![city_id])?;
            }
            Ok(favorite)
        })
    }

    /// Flip the favorite state of a city. Returns the new state.
    pub fn toggle_favorite(&self, city_id: i64) -> Result<bool> {
        let current = self.is_favorite(city_id)?;
        self.set_favorite(city_id, !current)
    }

    pub fn is_favorite(&self, city_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM favorites WHERE city_id = ?1)",
                params![city_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Favorite cities, ordered by name.
    pub fn list_favorites(&self) -> Result<Vec<City>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.country, c.latitude, c.longitude
                 FROM favorites f JOIN cities c ON c.id = f.city_id
                 ORDER BY c.name COLLATE NOCASE, c.country",
            )?;
            let cities = stmt
                .query_map([], |row| {
                    Ok(City {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        country: row.get(2)?,
                        latitude: row.get(3)?,
                        longitude: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(cities)
        })
    }
}
