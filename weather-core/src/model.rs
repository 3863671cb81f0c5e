use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Untyped payload returned by the weather service for one location.
pub type RawResponse = serde_json::Value;

/// One location's observation, with every field filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub city: String,
    pub country: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: i64,
    pub pressure: i64,
    pub wind_speed: f64,
    pub description: String,
    pub observed_at: DateTime<Utc>,
}

/// A cleaned table row: the record plus the time the table was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRow {
    pub city: String,
    pub country: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: i64,
    pub pressure: i64,
    pub wind_speed: f64,
    pub description: String,
    pub observed_at: DateTime<Utc>,
    pub extracted_at: DateTime<Utc>,
}

impl WeatherRow {
    pub fn from_record(record: WeatherRecord, extracted_at: DateTime<Utc>) -> Self {
        Self {
            city: record.city,
            country: record.country,
            temperature: record.temperature,
            feels_like: record.feels_like,
            humidity: record.humidity,
            pressure: record.pressure,
            wind_speed: record.wind_speed,
            description: record.description,
            observed_at: record.observed_at,
            extracted_at,
        }
    }
}

/// Sorted result of one pipeline run. Empty means "nothing to persist".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WeatherTable {
    rows: Vec<WeatherRow>,
}

impl WeatherTable {
    pub fn new(rows: Vec<WeatherRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[WeatherRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cities(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.city.as_str()).collect()
    }
}

impl IntoIterator for WeatherTable {
    type Item = WeatherRow;
    type IntoIter = std::vec::IntoIter<WeatherRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
