use anyhow::{Context, Result, anyhow, ensure};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{client::ClientSettings, extractor::ExtractorSettings, output::OutputFormat};

/// Value shipped in a fresh config; requests made with it are rejected by the service.
pub const PLACEHOLDER_API_KEY: &str = "demo_key_replace_me";

/// Environment variable that overrides `api.api_key`.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Remote service endpoint and credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub api_key: String,
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: PLACEHOLDER_API_KEY.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Timeouts, retry budget and pacing. Delays are in (fractional) seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub request_timeout_secs: f64,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    pub request_delay_secs: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10.0,
            max_retries: 3,
            retry_delay_secs: 2.0,
            request_delay_secs: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub file: String,
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            file: "weather_data.csv".to_string(),
            format: OutputFormat::Csv,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. "info" or "weather_etl_core=debug".
    pub level: String,

    /// Optional log file; an empty path keeps logging on stderr only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some(PathBuf::from("logs/pipeline.log")),
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// locations = ["Paris", "London"]
///
/// [api]
/// api_key = "..."
///
/// [network]
/// max_retries = 5
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub locations: Vec<String>,
    pub api: ApiConfig,
    pub network: NetworkConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locations: ["Paris", "London", "New York", "Tokyo", "Sydney"]
                .into_iter()
                .map(String::from)
                .collect(),
            api: ApiConfig::default(),
            network: NetworkConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load config from the platform location, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    /// Load config from an explicit path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the platform location.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;
        self.save_to(&path)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-etl", "weather-etl")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Take the API key from the environment when it is set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        self.apply_api_key_override(std::env::var(API_KEY_ENV).ok());
    }

    fn apply_api_key_override(&mut self, value: Option<String>) {
        if let Some(key) = value.filter(|k| !k.trim().is_empty()) {
            self.api.api_key = key;
        }
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.api.api_key = api_key;
    }

    pub fn has_placeholder_api_key(&self) -> bool {
        self.api.api_key == PLACEHOLDER_API_KEY || self.api.api_key.trim().is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.api.base_url.trim().is_empty(), "api.base_url must not be empty");
        ensure!(!self.locations.is_empty(), "locations must list at least one place");
        ensure!(
            self.locations.iter().all(|l| !l.trim().is_empty()),
            "locations must not contain empty names"
        );
        ensure!(self.network.max_retries >= 1, "network.max_retries must be at least 1");
        ensure!(
            self.network.request_timeout_secs > 0.0,
            "network.request_timeout_secs must be greater than zero"
        );

        for (name, secs) in [
            ("network.request_timeout_secs", self.network.request_timeout_secs),
            ("network.retry_delay_secs", self.network.retry_delay_secs),
            ("network.request_delay_secs", self.network.request_delay_secs),
        ] {
            ensure!(
                secs.is_finite() && secs >= 0.0,
                "{name} must be a non-negative number of seconds, got {secs}"
            );
        }

        Ok(())
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            base_url: self.api.base_url.clone(),
            api_key: self.api.api_key.clone(),
            timeout: secs(self.network.request_timeout_secs),
            max_attempts: self.network.max_retries,
            retry_delay: secs(self.network.retry_delay_secs),
        }
    }

    pub fn extractor_settings(&self) -> ExtractorSettings {
        ExtractorSettings {
            default_locations: self.locations.clone(),
            request_delay: secs(self.network.request_delay_secs),
        }
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.logging
            .file
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// `output.dir`/`output.file`, with the extension following `output.format`.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .dir
            .join(&self.output.file)
            .with_extension(self.output.format.as_str())
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
