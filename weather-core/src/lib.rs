//! Core library for the `weather-etl` pipeline.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - A retrying client for the current-weather endpoint
//! - Sequential extraction over a list of locations
//! - Defensive parsing into typed records and table cleaning
//! - CSV / JSON output and the orchestrating pipeline
//!
//! It is used by `weather-etl`, but can also be reused by other binaries or services.

pub mod client;
pub mod config;
pub mod extractor;
pub mod model;
pub mod output;
pub mod pause;
pub mod pipeline;
pub mod transformer;

pub use client::{ClientError, ClientSettings, WeatherClient, WeatherSource};
pub use config::Config;
pub use extractor::{ExtractionStats, Extractor, ExtractorSettings, Ownership};
pub use model::{RawResponse, WeatherRecord, WeatherRow, WeatherTable};
pub use output::{CsvWriter, JsonWriter, OutputError, OutputFormat, TableWriter};
pub use pipeline::{Pipeline, PipelineError, PipelineStats, RunReport};
pub use transformer::{ParseError, Transformer};
