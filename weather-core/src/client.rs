use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::{
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    model::RawResponse,
    pause::{Pause, TokioPause},
};

/// Units system requested from the service; temperatures come back in °C, wind in m/s.
const UNITS: &str = "metric";

/// A rate-limited attempt waits `retry_delay * RATE_LIMIT_PENALTY` on top of the backoff.
const RATE_LIMIT_PENALTY: u32 = 5;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(
        "Weather service rejected the API key (status {status}) while fetching '{location}'.\n\
         Hint: check `api.api_key` or set OPENWEATHER_API_KEY."
    )]
    Authentication { location: String, status: StatusCode },

    #[error("Failed to build HTTP client")]
    Build(#[source] reqwest::Error),

    #[error("Weather client used after close")]
    Closed,
}

impl ClientError {
    /// Only authentication failures abort a batch.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClientError::Authentication { .. })
    }
}

/// Endpoint, credential and retry policy for [`WeatherClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl ClientSettings {
    /// Wait after failed attempt `attempt` (1-based): `retry_delay * 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.retry_delay.saturating_mul(factor)
    }

    pub fn rate_limit_penalty(&self) -> Duration {
        self.retry_delay.saturating_mul(RATE_LIMIT_PENALTY)
    }
}

/// Anything that can resolve a location to a raw observation.
///
/// `Ok(None)` is the definitive "no data" outcome (unknown location or retry
/// budget exhausted). `Err` is reserved for failures that must stop the run.
#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    async fn fetch(&self, location: &str) -> Result<Option<RawResponse>, ClientError>;

    /// Release pooled connections. Idempotent.
    fn close(&self);
}

enum Attempt {
    Data(RawResponse),
    NotFound,
    RateLimited,
    Failed,
}

/// Current-weather client with timeout, exponential backoff and status classification.
#[derive(Debug)]
pub struct WeatherClient {
    settings: ClientSettings,
    http: Mutex<Option<Client>>,
    pause: Arc<dyn Pause>,
}

impl WeatherClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ClientError> {
        Self::with_pause(settings, Arc::new(TokioPause))
    }

    pub fn with_pause(settings: ClientSettings, pause: Arc<dyn Pause>) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(ClientError::Build)?;

        info!(base_url = %settings.base_url, "weather client initialised");

        Ok(Self {
            settings,
            http: Mutex::new(Some(http)),
            pause,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn http(&self) -> Result<Client, ClientError> {
        self.http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ClientError::Closed)
    }

    async fn attempt(&self, http: &Client, location: &str) -> Result<Attempt, ClientError> {
        let sent = http
            .get(&self.settings.base_url)
            .query(&[
                ("q", location),
                ("appid", self.settings.api_key.as_str()),
                ("units", UNITS),
            ])
            .send()
            .await;

        let res = match sent {
            Ok(res) => res,
            Err(e) => {
                if e.is_timeout() {
                    warn!(location, "request timed out");
                } else if e.is_connect() {
                    warn!(location, error = %e, "connection failed");
                } else {
                    warn!(location, error = %e, "network error");
                }
                return Ok(Attempt::Failed);
            }
        };

        let status = res.status();
        match status {
            StatusCode::UNAUTHORIZED => {
                error!(location, %status, "API key rejected");
                Err(ClientError::Authentication {
                    location: location.to_string(),
                    status,
                })
            }
            StatusCode::NOT_FOUND => {
                warn!(location, "location not found");
                Ok(Attempt::NotFound)
            }
            StatusCode::TOO_MANY_REQUESTS => {
                warn!(location, "rate limit reached");
                Ok(Attempt::RateLimited)
            }
            s if s.is_success() => match res.json::<RawResponse>().await {
                Ok(raw) => Ok(Attempt::Data(raw)),
                Err(e) => {
                    warn!(location, error = %e, "failed to read response body");
                    Ok(Attempt::Failed)
                }
            },
            s => {
                let body = res.text().await.unwrap_or_default();
                warn!(location, status = %s, body = %truncate_body(&body), "HTTP error");
                Ok(Attempt::Failed)
            }
        }
    }
}

#[async_trait]
impl WeatherSource for WeatherClient {
    async fn fetch(&self, location: &str) -> Result<Option<RawResponse>, ClientError> {
        let http = self.http()?;
        let max_attempts = self.settings.max_attempts;

        for attempt in 1..=max_attempts {
            debug!(location, attempt, max_attempts, "requesting current weather");

            match self.attempt(&http, location).await? {
                Attempt::Data(raw) => {
                    info!(location, attempt, "weather fetched");
                    return Ok(Some(raw));
                }
                Attempt::NotFound => return Ok(None),
                Attempt::RateLimited => {
                    let penalty = self.settings.rate_limit_penalty();
                    debug!(location, delay_ms = penalty.as_millis() as u64, "rate limit penalty");
                    self.pause.pause(penalty).await;
                }
                Attempt::Failed => {}
            }

            if attempt < max_attempts {
                let delay = self.settings.backoff(attempt);
                debug!(location, attempt, delay_ms = delay.as_millis() as u64, "backing off");
                self.pause.pause(delay).await;
            }
        }

        error!(location, attempts = max_attempts, "giving up after exhausting retries");
        Ok(None)
    }

    fn close(&self) {
        let released = self
            .http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if released.is_some() {
            debug!("HTTP session closed");
        }
    }
}

fn truncate_body(body: &str) -> &str {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
