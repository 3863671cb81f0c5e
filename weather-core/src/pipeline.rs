use std::{
    path::PathBuf,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{error, info};

use crate::{
    client::ClientError,
    config::Config,
    extractor::Extractor,
    model::WeatherTable,
    output::{OutputError, TableWriter, writer_for},
    transformer::Transformer,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Extraction aborted")]
    Extraction(#[from] ClientError),

    #[error("Saving results failed")]
    Output(#[from] OutputError),
}

/// Successful run: the persisted table and where it went.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub table: WeatherTable,
    pub output_path: PathBuf,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStats {
    pub locations_configured: usize,
    pub api_url: String,
    pub output_path: PathBuf,
}

/// Extract, transform, save. A pipeline runs once: `run` consumes it and
/// closes the extractor on the way out.
#[derive(Debug)]
pub struct Pipeline {
    extractor: Extractor,
    transformer: Transformer,
    writer: Box<dyn TableWriter>,
    output_path: PathBuf,
    locations: Vec<String>,
    api_url: String,
}

impl Pipeline {
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        let extractor = Extractor::new(config.client_settings(), config.extractor_settings())?;
        let pipeline = Self::new(
            extractor,
            Transformer::new(),
            writer_for(config.output.format),
            config.output_path(),
        )
        .with_api_url(config.api.base_url.clone())
        .with_locations(config.locations.clone());

        info!("pipeline initialised");
        Ok(pipeline)
    }

    pub fn new(
        extractor: Extractor,
        transformer: Transformer,
        writer: Box<dyn TableWriter>,
        output_path: PathBuf,
    ) -> Self {
        Self {
            extractor,
            transformer,
            writer,
            output_path,
            locations: Vec::new(),
            api_url: String::new(),
        }
    }

    /// Locations to fetch; empty means the extractor's defaults.
    pub fn with_locations(mut self, locations: Vec<String>) -> Self {
        self.locations = locations;
        self
    }

    pub fn with_output_path(mut self, output_path: PathBuf) -> Self {
        self.output_path = output_path;
        self
    }

    pub fn with_api_url(mut self, api_url: String) -> Self {
        self.api_url = api_url;
        self
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            locations_configured: self.locations.len(),
            api_url: self.api_url.clone(),
            output_path: self.output_path.clone(),
        }
    }

    /// `Ok(None)` when nothing was extracted or nothing survived parsing.
    pub async fn run(mut self) -> Result<Option<RunReport>, PipelineError> {
        let started = Instant::now();
        info!("weather pipeline starting");

        let outcome = self.run_stages(started).await;
        self.extractor.close();

        if let Err(e) = &outcome {
            error!(error = %e, "pipeline failed");
        }
        outcome
    }

    async fn run_stages(&mut self, started: Instant) -> Result<Option<RunReport>, PipelineError> {
        info!(stage = "extract", "extracting data");
        let raw = self.extractor.extract_all(&self.locations).await?;
        if raw.is_empty() {
            error!("no data extracted, stopping");
            return Ok(None);
        }
        info!(locations = raw.len(), "extracted");

        info!(stage = "transform", "transforming data");
        let table = self.transformer.transform_all(&raw);
        if table.is_empty() {
            error!("table empty after transformation, stopping");
            return Ok(None);
        }
        info!(rows = table.len(), "transformed");

        info!(stage = "save", "saving results");
        let output_path = self.writer.write(&table, &self.output_path)?;

        let duration = started.elapsed();
        info!(
            rows = table.len(),
            path = %output_path.display(),
            duration_secs = duration.as_secs_f64(),
            "pipeline finished"
        );

        Ok(Some(RunReport {
            table,
            output_path,
            duration,
        }))
    }
}
