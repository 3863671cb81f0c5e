use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;

use crate::model::WeatherTable;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to create output directory '{0}'")]
    CreateDir(PathBuf, #[source] std::io::Error),

    #[error("Failed to write output file '{0}'")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to encode CSV output '{0}'")]
    Csv(PathBuf, #[source] csv::Error),

    #[error("Failed to encode JSON output '{0}'")]
    Json(PathBuf, #[source] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for OutputFormat {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            _ => Err(anyhow::anyhow!(
                "Unknown output format '{value}'. Supported formats: csv, json."
            )),
        }
    }
}

/// Persists a finished table. Returns the path actually written.
pub trait TableWriter: Send + Sync + Debug {
    fn write(&self, table: &WeatherTable, path: &Path) -> Result<PathBuf, OutputError>;
}

/// UTF-8 CSV with a header row.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvWriter;

impl TableWriter for CsvWriter {
    fn write(&self, table: &WeatherTable, path: &Path) -> Result<PathBuf, OutputError> {
        let file = create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for row in table.rows() {
            writer
                .serialize(row)
                .map_err(|e| OutputError::Csv(path.to_path_buf(), e))?;
        }
        writer
            .flush()
            .map_err(|e| OutputError::Io(path.to_path_buf(), e))?;

        info!(path = %path.display(), rows = table.len(), "results saved");
        Ok(path.to_path_buf())
    }
}

/// Pretty-printed JSON array of row objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWriter;

impl TableWriter for JsonWriter {
    fn write(&self, table: &WeatherTable, path: &Path) -> Result<PathBuf, OutputError> {
        let mut file = BufWriter::new(create(path)?);

        serde_json::to_writer_pretty(&mut file, table)
            .map_err(|e| OutputError::Json(path.to_path_buf(), e))?;
        file.flush()
            .map_err(|e| OutputError::Io(path.to_path_buf(), e))?;

        info!(path = %path.display(), rows = table.len(), "JSON saved");
        Ok(path.to_path_buf())
    }
}

pub fn writer_for(format: OutputFormat) -> Box<dyn TableWriter> {
    match format {
        OutputFormat::Csv => Box::new(CsvWriter),
        OutputFormat::Json => Box::new(JsonWriter),
    }
}

fn create(path: &Path) -> Result<File, OutputError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| OutputError::CreateDir(parent.to_path_buf(), e))?;
    }
    File::create(path).map_err(|e| OutputError::Io(path.to_path_buf(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WeatherRow;
    use chrono::{DateTime, Utc};

    fn table() -> WeatherTable {
        let observed = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let extracted = DateTime::from_timestamp(1_700_000_600, 0).unwrap();
        let row = |city: &str, description: &str| WeatherRow {
            city: city.into(),
            country: "GB".into(),
            temperature: 19.1,
            feels_like: 18.0,
            humidity: 70,
            pressure: 1012,
            wind_speed: 4.2,
            description: description.into(),
            observed_at: observed,
            extracted_at: extracted,
        };
        WeatherTable::new(vec![row("London", "light rain"), row("Zürich", "brouillard, épais")])
    }

    #[test]
    fn csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("weather.csv");

        let written = CsvWriter.write(&table(), &path).unwrap();
        assert_eq!(written, path);

        let contents = fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next(),
            Some(
                "city,country,temperature,feels_like,humidity,pressure,wind_speed,description,observed_at,extracted_at"
            )
        );
        assert_eq!(
            lines.next(),
            Some("London,GB,19.1,18.0,70,1012,4.2,light rain,2023-11-14T22:13:20Z,2023-11-14T22:23:20Z")
        );
        let third = lines.next().unwrap();
        assert!(third.starts_with("Zürich,"));
        assert!(third.contains("\"brouillard, épais\""));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn json_is_array_of_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.json");

        JsonWriter.write(&table(), &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["city"], "London");
        assert_eq!(rows[1]["extracted_at"], "2023-11-14T22:23:20Z");
    }

    #[test]
    fn format_parsing() {
        assert_eq!(OutputFormat::try_from("JSON").unwrap(), OutputFormat::Json);
        let err = OutputFormat::try_from("xml").unwrap_err();
        assert!(err.to_string().contains("Unknown output format"));
    }

    #[test]
    fn writer_for_matches_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.json");

        writer_for(OutputFormat::Json).write(&table(), &path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().trim_start().starts_with('['));
    }
}
