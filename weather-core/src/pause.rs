use async_trait::async_trait;
use std::{fmt::Debug, time::Duration};

/// Deliberate waits between retries and between requests.
#[async_trait]
pub trait Pause: Send + Sync + Debug {
    async fn pause(&self, delay: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records requested delays without sleeping.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingPause {
        delays: Arc<Mutex<Vec<Duration>>>,
    }

    impl RecordingPause {
        pub fn delays(&self) -> Vec<Duration> {
            self.delays.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Pause for RecordingPause {
        async fn pause(&self, delay: Duration) {
            self.delays.lock().unwrap().push(delay);
        }
    }
}
