//! Coordinates and named point collections
//!
//! Coordinates arrive in several equivalent shapes (plain pairs, arrays,
//! labeled structs, GeoJSON positions) and are normalized to a single
//! (longitude, latitude) ordering before anything is serialized onto the
//! wire.

use std::collections::HashSet;
use std::path::Path;

use crate::core::error::{Error, Result};

/// A WGS84 coordinate, stored as (longitude, latitude)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub lon: f64,
    pub lat: f64,
}

impl Coord {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Serialized `lon,lat` form used in OSRM request paths
    pub fn to_param(&self) -> String {
        format!("{},{}", self.lon, self.lat)
    }
}

impl From<(f64, f64)> for Coord {
    /// Plain pairs are read as (longitude, latitude)
    fn from((lon, lat): (f64, f64)) -> Self {
        Self { lon, lat }
    }
}

impl From<[f64; 2]> for Coord {
    /// GeoJSON position ordering: [longitude, latitude]
    fn from([lon, lat]: [f64; 2]) -> Self {
        Self { lon, lat }
    }
}

/// One (origin, destination) identifier pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ODPair {
    pub origin_id: String,
    pub dest_id: String,
}

impl ODPair {
    pub fn new(origin_id: impl Into<String>, dest_id: impl Into<String>) -> Self {
        Self {
            origin_id: origin_id.into(),
            dest_id: dest_id.into(),
        }
    }
}

/// A named, ordered collection of identified points
///
/// Identifiers must be unique within a set. Ordering is irrelevant to
/// correctness but preserved so matrix rows and columns come out stable.
#[derive(Debug, Clone)]
pub struct PointSet {
    name: String,
    points: Vec<(String, Coord)>,
}

impl PointSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: Vec::new(),
        }
    }

    /// Build a set from (id, coord) pairs; duplicate ids are rejected
    pub fn from_points<I, S, C>(name: impl Into<String>, points: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, C)>,
        S: Into<String>,
        C: Into<Coord>,
    {
        let mut set = Self::new(name);
        for (id, coord) in points {
            set.push(id, coord)?;
        }
        Ok(set)
    }

    /// Append a point; fails on a duplicate identifier
    pub fn push(&mut self, id: impl Into<String>, coord: impl Into<Coord>) -> Result<()> {
        let id = id.into();
        if self.points.iter().any(|(existing, _)| *existing == id) {
            return Err(Error::Configuration(format!(
                "duplicate point id '{}' in set '{}'",
                id, self.name
            )));
        }
        self.points.push((id, coord.into()));
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.points.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn coords(&self) -> Vec<Coord> {
        self.points.iter().map(|(_, coord)| *coord).collect()
    }

    pub fn get(&self, id: &str) -> Option<Coord> {
        self.points
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, coord)| *coord)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Coord)> {
        self.points.iter()
    }

    /// Load Point features from a GeoJSON FeatureCollection file
    ///
    /// Non-point geometries are skipped. The identifier is taken from an `id`
    /// property when present, otherwise from the feature index.
    pub fn from_geojson_file(path: impl AsRef<Path>, name: impl Into<String>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let json: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| Error::Configuration(format!("invalid GeoJSON: {}", e)))?;

        let features = json["features"].as_array().ok_or_else(|| {
            Error::Configuration(format!(
                "expected a FeatureCollection in {}",
                path.as_ref().display()
            ))
        })?;

        let mut set = Self::new(name);
        let mut seen: HashSet<String> = HashSet::new();

        for (index, feature) in features.iter().enumerate() {
            let geometry = &feature["geometry"];
            if geometry["type"].as_str() != Some("Point") {
                continue;
            }
            let coords = geometry["coordinates"].as_array().ok_or_else(|| {
                Error::Configuration(format!("feature {} has no coordinates", index))
            })?;
            let (lon, lat) = match (coords.first(), coords.get(1)) {
                (Some(lon), Some(lat)) => (
                    lon.as_f64().unwrap_or(f64::NAN),
                    lat.as_f64().unwrap_or(f64::NAN),
                ),
                _ => {
                    return Err(Error::Configuration(format!(
                        "feature {} has malformed coordinates",
                        index
                    )))
                }
            };

            let id = feature["properties"]["id"]
                .as_str()
                .map(str::to_string)
                .or_else(|| feature["properties"]["id"].as_i64().map(|n| n.to_string()))
                .unwrap_or_else(|| index.to_string());

            if !seen.insert(id.clone()) {
                return Err(Error::Configuration(format!(
                    "duplicate point id '{}' in {}",
                    id,
                    path.as_ref().display()
                )));
            }
            set.push(id, Coord::new(lon, lat))?;
        }

        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_coord_representations_normalize_identically() {
        let from_pair: Coord = (31.14, -26.52).into();
        let from_array: Coord = [31.14, -26.52].into();
        let labeled = Coord::new(31.14, -26.52);

        assert_eq!(from_pair.to_param(), "31.14,-26.52");
        assert_eq!(from_pair.to_param(), from_array.to_param());
        assert_eq!(from_pair.to_param(), labeled.to_param());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut set = PointSet::new("homesteads");
        set.push("h1", (31.0, -26.0)).unwrap();
        let result = set.push("h1", (31.1, -26.1));
        assert!(matches!(result, Err(Error::Configuration(_))));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_ordering_is_preserved() {
        let set = PointSet::from_points(
            "schools",
            vec![("s2", (31.2, -26.2)), ("s1", (31.1, -26.1))],
        )
        .unwrap();
        assert_eq!(set.ids(), vec!["s2", "s1"]);
        assert_eq!(set.get("s1"), Some(Coord::new(31.1, -26.1)));
        assert_eq!(set.get("missing"), None);
    }

    #[test]
    fn test_from_geojson_file_points_only() {
        let geojson = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature",
                 "properties": {"id": "h1"},
                 "geometry": {"type": "Point", "coordinates": [31.14, -26.52]}},
                {"type": "Feature",
                 "properties": {},
                 "geometry": {"type": "LineString",
                              "coordinates": [[0, 0], [1, 1]]}},
                {"type": "Feature",
                 "properties": {"id": 42},
                 "geometry": {"type": "Point", "coordinates": [31.2, -26.5]}}
            ]
        }"#;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(geojson.as_bytes()).unwrap();

        let set = PointSet::from_geojson_file(file.path(), "homesteads").unwrap();
        assert_eq!(set.len(), 2, "line features are filtered out");
        assert_eq!(set.ids(), vec!["h1", "42"]);
        assert_eq!(set.get("h1"), Some(Coord::new(31.14, -26.52)));
    }
}
