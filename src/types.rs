//! Core data types for the city dataset.

use serde::{Deserialize, Serialize};

/// A city as persisted in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub id: i64,
    pub name: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Nested coordinate object used by the bundled dataset.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

/// One record as it appears in the source asset.
///
/// Accepts the bundled dataset shape
/// (`{"_id": 1, "name": "..", "country": "..", "coord": {"lon": .., "lat": ..}}`)
/// as well as a flat shape with `latitude`/`longitude` fields.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRecord {
    #[serde(alias = "_id")]
    pub id: i64,
    pub name: String,
    pub country: String,
    #[serde(default)]
    pub coord: Option<Coord>,
    #[serde(default, alias = "lat")]
    pub latitude: Option<f64>,
    #[serde(default, alias = "lon")]
    pub longitude: Option<f64>,
}

impl SourceRecord {
    /// Resolve coordinates and validate ranges, producing a storable row.
    pub fn into_city(self) -> Result<City, String> {
        let (latitude, longitude) = match (self.coord, self.latitude, self.longitude) {
            (Some(coord), _, _) => (coord.lat, coord.lon),
            (None, Some(lat), Some(lon)) => (lat, lon),
            _ => return Err("missing coordinates".to_string()),
        };

        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(format!("latitude out of range: {}", latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(format!("longitude out of range: {}", longitude));
        }

        let name = self.name.trim();
        if name.is_empty() {
            return Err("empty name".to_string());
        }

        Ok(City {
            id: self.id,
            name: name.to_string(),
            country: self.country.trim().to_string(),
            latitude,
            longitude,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_shape() {
        let record: SourceRecord = serde_json::from_str(
            r#"{"country":"UA","name":"Hurzuf","_id":707860,"coord":{"lon":34.283333,"lat":44.549999}}"#,
        )
        .unwrap();
        let city = record.into_city().unwrap();
        assert_eq!(city.id, 707860);
        assert_eq!(city.name, "Hurzuf");
        assert_eq!(city.country, "UA");
        assert_eq!(city.latitude, 44.549999);
        assert_eq!(city.longitude, 34.283333);
    }

    #[test]
    fn test_flat_shape() {
        let record: SourceRecord = serde_json::from_str(
            r#"{"id":1,"name":"Sydney","country":"AU","latitude":-33.86,"longitude":151.2}"#,
        )
        .unwrap();
        let city = record.into_city().unwrap();
        assert_eq!(city.id, 1);
        assert_eq!(city.latitude, -33.86);
    }

    #[test]
    fn test_missing_coordinates() {
        let record: SourceRecord =
            serde_json::from_str(r#"{"_id":2,"name":"Nowhere","country":"XX"}"#).unwrap();
        assert_eq!(record.into_city().unwrap_err(), "missing coordinates");
    }

    #[test]
    fn test_out_of_range() {
        let record: SourceRecord = serde_json::from_str(
            r#"{"_id":3,"name":"Bad","country":"XX","coord":{"lon":10.0,"lat":91.0}}"#,
        )
        .unwrap();
        assert!(record.into_city().unwrap_err().contains("latitude"));
    }

    #[test]
    fn test_blank_name_rejected() {
        let record: SourceRecord = serde_json::from_str(
            r#"{"_id":4,"name":"  ","country":"XX","coord":{"lon":1.0,"lat":1.0}}"#,
        )
        .unwrap();
        assert_eq!(record.into_city().unwrap_err(), "empty name");
    }
}
