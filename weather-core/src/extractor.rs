use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    client::{ClientError, ClientSettings, WeatherClient, WeatherSource},
    model::RawResponse,
    pause::{Pause, TokioPause},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorSettings {
    /// Used when `extract_all` is given no locations.
    pub default_locations: Vec<String>,

    /// Unconditional wait between consecutive requests.
    pub request_delay: Duration,
}

/// Whether the extractor closes its source on teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    Borrowed,
}

/// Outcome counters of the latest `extract_all` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Drives a [`WeatherSource`] over a list of locations, one at a time.
#[derive(Debug)]
pub struct Extractor {
    source: Arc<dyn WeatherSource>,
    ownership: Ownership,
    settings: ExtractorSettings,
    pause: Arc<dyn Pause>,
    last_stats: ExtractionStats,
}

impl Extractor {
    /// Build an extractor with its own [`WeatherClient`], closed by [`Extractor::close`].
    pub fn new(
        client_settings: ClientSettings,
        settings: ExtractorSettings,
    ) -> Result<Self, ClientError> {
        let client = WeatherClient::new(client_settings)?;
        Ok(Self::with_source(Arc::new(client), Ownership::Owned, settings))
    }

    pub fn with_source(
        source: Arc<dyn WeatherSource>,
        ownership: Ownership,
        settings: ExtractorSettings,
    ) -> Self {
        Self {
            source,
            ownership,
            settings,
            pause: Arc::new(TokioPause),
            last_stats: ExtractionStats::default(),
        }
    }

    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn last_stats(&self) -> ExtractionStats {
        self.last_stats
    }

    pub async fn extract_single(&self, location: &str) -> Result<Option<RawResponse>, ClientError> {
        debug!(location, "extracting");
        self.source.fetch(location).await
    }

    /// Fetch every location in order. Locations without data are counted and
    /// skipped; only a terminal client error aborts the batch.
    pub async fn extract_all(&mut self, locations: &[String]) -> Result<Vec<RawResponse>, ClientError> {
        let locations = if locations.is_empty() {
            self.settings.default_locations.clone()
        } else {
            locations.to_vec()
        };

        let total = locations.len();
        let mut results = Vec::with_capacity(total);
        let mut stats = ExtractionStats {
            requested: total,
            ..ExtractionStats::default()
        };

        info!(locations = total, "starting extraction");

        for (i, location) in locations.iter().enumerate() {
            debug!(location = %location, index = i + 1, total, "processing location");

            match self.extract_single(location).await? {
                Some(raw) => {
                    results.push(raw);
                    stats.succeeded += 1;
                }
                None => {
                    stats.failed += 1;
                    warn!(location = %location, "extraction failed");
                }
            }
            self.last_stats = stats;

            if i + 1 < total {
                self.pause.pause(self.settings.request_delay).await;
            }
        }

        info!(
            succeeded = stats.succeeded,
            failed = stats.failed,
            total,
            "extraction finished"
        );

        Ok(results)
    }

    /// Release the source if this extractor created it.
    pub fn close(&self) {
        if self.ownership == Ownership::Owned {
            self.source.close();
        }
        debug!("extractor closed");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Copy)]
    pub enum Scripted {
        Data,
        Malformed,
        NoData,
        Unauthorized,
    }

    /// Source answering from a per-location script; unknown locations get data.
    #[derive(Debug, Default)]
    pub struct ScriptedSource {
        script: Vec<(String, Scripted)>,
        calls: Mutex<Vec<String>>,
        closes: AtomicUsize,
    }

    impl ScriptedSource {
        pub fn new(script: &[(&str, Scripted)]) -> Self {
            Self {
                script: script.iter().map(|(l, s)| (l.to_string(), *s)).collect(),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherSource for ScriptedSource {
        async fn fetch(&self, location: &str) -> Result<Option<RawResponse>, ClientError> {
            self.calls.lock().unwrap().push(location.to_string());
            let outcome = self
                .script
                .iter()
                .find(|(l, _)| l == location)
                .map(|(_, s)| *s)
                .unwrap_or(Scripted::Data);

            match outcome {
                Scripted::Data => Ok(Some(json!({
                    "name": location,
                    "sys": {"country": "XX"},
                    "main": {"temp": 10.0, "feels_like": 9.0, "humidity": 50, "pressure": 1000},
                    "wind": {"speed": 1.0},
                    "weather": [{"description": "cloudy"}],
                    "dt": 1_700_000_000
                }))),
                Scripted::Malformed => Ok(Some(json!({"name": location, "main": {"temp": "hot"}}))),
                Scripted::NoData => Ok(None),
                Scripted::Unauthorized => Err(ClientError::Authentication {
                    location: location.to_string(),
                    status: StatusCode::UNAUTHORIZED,
                }),
            }
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
