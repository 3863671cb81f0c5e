use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info, warn};
use weather_etl_core::{Config, OutputFormat, Pipeline, config::API_KEY_ENV};

use crate::{logger, preview};

/// Exit status after Ctrl-C, as shells report SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "weather-etl",
    version,
    about = "Fetch current weather for a list of locations and save it as a table"
)]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging with source locations; ignores RUST_LOG.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the extract/transform/save pipeline.
    Run {
        /// Output file; defaults to `output.dir`/`output.file` from the config.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: "csv" or "json".
        #[arg(long)]
        format: Option<String>,

        /// Locations to fetch instead of the configured list.
        locations: Vec<String>,
    },

    /// Store the OpenWeatherMap API key in the config file.
    Configure {
        /// Key to store; prompts when absent.
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Show what a run would use.
    Stats,
}

impl Cli {
    pub async fn run(self) -> Result<ExitCode> {
        let config_path = match self.config {
            Some(path) => path,
            None => Config::config_file_path()?,
        };

        match self.command {
            Command::Run {
                output,
                format,
                locations,
            } => {
                let config = run_config(&config_path, format.as_deref(), locations)?;

                logger::init(&config.logging.level, self.debug, config.log_file())?;
                run_pipeline(&config, output).await
            }
            Command::Configure { api_key } => {
                let mut config = load(&config_path)?;
                let api_key = match api_key {
                    Some(key) => key,
                    None => inquire::Password::new("OpenWeatherMap API key:")
                        .without_confirmation()
                        .prompt()
                        .context("Failed to read API key")?,
                };

                config.set_api_key(api_key.trim().to_string());
                config.save_to(&config_path)?;
                println!("Saved configuration to {}", config_path.display());
                Ok(ExitCode::SUCCESS)
            }
            Command::Stats => {
                let config = load(&config_path)?;
                let stats = Pipeline::from_config(&config)?.stats();

                println!("config file:          {}", config_path.display());
                println!("locations configured: {}", stats.locations_configured);
                println!("api url:              {}", stats.api_url);
                println!("output file:          {}", stats.output_path.display());
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

fn load(path: &std::path::Path) -> Result<Config> {
    let mut config = Config::load_from(path)?;
    config.apply_env_overrides();
    Ok(config)
}

/// Config for `run`: positional locations replace the configured list before validation.
fn run_config(path: &std::path::Path, format: Option<&str>, locations: Vec<String>) -> Result<Config> {
    let mut config = load(path)?;
    if let Some(format) = format {
        config.output.format = OutputFormat::try_from(format)?;
    }
    if !locations.is_empty() {
        config.locations = locations;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run_pipeline(config: &Config, output: Option<PathBuf>) -> Result<ExitCode> {
    info!("starting weather-etl");

    if config.has_placeholder_api_key() {
        warn!("API key is not configured; requests will be rejected.");
        warn!("Run `weather-etl configure` or set {API_KEY_ENV}.");
    }

    let mut pipeline = Pipeline::from_config(config)?;
    if let Some(path) = output {
        pipeline = pipeline.with_output_path(path);
    }

    let outcome = tokio::select! {
        outcome = pipeline.run() => outcome,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted by user");
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
    };

    match outcome? {
        Some(report) => {
            println!("\n{}", preview::render(&report.table));
            Ok(ExitCode::SUCCESS)
        }
        None => {
            error!("pipeline produced no result");
            Ok(ExitCode::FAILURE)
        }
    }
}
