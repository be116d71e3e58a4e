use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A point on the globe. Only constructible with in-range values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct GeoCoordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinate> for GeoCoordinate {
    type Error = Error;

    fn try_from(raw: RawCoordinate) -> Result<Self> {
        Self::new(raw.latitude, raw.longitude)
    }
}

impl GeoCoordinate {
    pub const UTRECHT: Self = Self { latitude: 52.0907, longitude: 5.1214 };

    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        // RangeInclusive::contains is false for NaN.
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidCoordinate { latitude, longitude });
        }
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// `"lat,lng"`, the shape the Places API expects for `location=`.
    pub fn to_query_value(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

impl std::fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5}, {:.5}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SunlightQuery {
    pub timestamp: DateTime<Utc>,
    pub location: GeoCoordinate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SunlightResult {
    pub is_daylight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceCategory {
    Restaurant,
    Bar,
    Cafe,
    Park,
}

impl PlaceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceCategory::Restaurant => "restaurant",
            PlaceCategory::Bar => "bar",
            PlaceCategory::Cafe => "cafe",
            PlaceCategory::Park => "park",
        }
    }
}

impl std::fmt::Display for PlaceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRef {
    pub reference: String,
    pub width: u32,
    pub height: u32,
    pub attributions: Vec<String>,
}

/// A place as the rest of the application sees it, whatever schema it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub id: String,
    pub name: String,
    pub coordinate: GeoCoordinate,
    pub rating: Option<f64>,
    pub rating_count: Option<u32>,
    pub address: String,
    pub photos: Vec<PhotoRef>,
    pub outdoor_seating: Option<bool>,
    pub category: PlaceCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitySuggestion {
    pub place_id: String,
    pub name: String,
    pub secondary_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceSuggestion {
    pub place_id: String,
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature: f64,
    pub uv_index: f64,
    pub icon: String,
    pub description: String,
    pub condition: String,
}
