//! Resource source: a single remote object whose data map holds the files.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use super::snapshot::FileSnapshot;
use super::{sleep_or_shutdown, ConfigFileChange, RetryPolicy, SourceDriver, SourceSink};
use crate::error::{Result, SyncError};

/// Default interval between resource fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Fetches the full data map of a watched resource.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Human readable description of the resource, e.g. `configmap/ns/name`.
    fn describe(&self) -> String;

    /// Returns the current `key -> content` map, or `None` if the resource
    /// does not exist.
    async fn fetch(&self) -> Result<Option<BTreeMap<String, String>>>;
}

/// Polls a [`ResourceClient`] and reports per-key changes.
///
/// Every fetch is a full snapshot diffed against the previous one. A
/// missing resource removes every key it used to have.
pub struct ResourceSourceDriver<C> {
    client: C,
    poll_interval: Duration,
    retry: RetryPolicy,
    snapshot: FileSnapshot,
}

impl<C: ResourceClient> ResourceSourceDriver<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
            snapshot: FileSnapshot::new(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetches once and returns the resulting changes.
    pub async fn poll(&mut self) -> Result<Vec<ConfigFileChange>> {
        match self.client.fetch().await? {
            Some(data) => Ok(self.snapshot.replace_all(data)),
            None => {
                if !self.snapshot.is_empty() {
                    log::info!(
                        "{} was deleted, removing {} files",
                        self.client.describe(),
                        self.snapshot.len()
                    );
                }
                Ok(self.snapshot.clear())
            }
        }
    }
}

#[async_trait]
impl<C: ResourceClient> SourceDriver for ResourceSourceDriver<C> {
    fn name(&self) -> String {
        self.client.describe()
    }

    async fn run(&mut self, sink: SourceSink, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        log::info!("Started polling {}", self.client.describe());
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let wait = match self.poll().await {
                Ok(changes) => {
                    if failures > 0 {
                        log::info!("{} reachable again", self.client.describe());
                        failures = 0;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                    if !sink.send_all(changes) {
                        break;
                    }
                    self.poll_interval
                }
                Err(e) if e.is_retryable() && failures < self.retry.max_retries => {
                    failures = failures.saturating_add(1);
                    let delay = self.retry.delay_for(failures);
                    log::warn!(
                        "Fetching {} failed (attempt {}/{}), retrying in {:?}: {}",
                        self.client.describe(),
                        failures,
                        self.retry.max_retries,
                        delay,
                        e
                    );
                    delay
                }
                Err(e) => {
                    return Err(SyncError::SourceExhausted {
                        source_name: self.client.describe(),
                        attempts: failures.saturating_add(1),
                        message: e.to_string(),
                    });
                }
            };

            if sleep_or_shutdown(wait, &mut shutdown).await {
                break;
            }
        }

        log::info!("Stopped polling {}", self.client.describe());
        Ok(())
    }
}
