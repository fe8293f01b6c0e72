//! Stabilization-aware polling.
//!
//! A single successful scrape is not enough evidence of a complete payload:
//! the exporter may still be mid-write, or may not have started publishing
//! at all. The poller keeps calling until two consecutive successful
//! responses carry byte-identical, non-empty content.

use crate::endpoint::EndpointSource;
use crate::scrape::request::{Executor, RequestSpec};
use std::time::Duration;

/// Delays between poll iterations. Both loops are deliberately unbounded;
/// waiting out a slow or absent exporter is this layer's job, and process
/// supervision handles termination.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Wait after a failed scrape before resolving and calling again.
    pub retry_delay: Duration,
    /// Wait between successful scrapes while the content is still changing.
    pub settle_delay: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            settle_delay: Duration::from_secs(5),
        }
    }
}

/// Polls one scrape target until its payload stabilizes.
pub struct StabilizationPoller<'a> {
    executor: &'a Executor,
    source: &'a dyn EndpointSource,
    config: PollerConfig,
}

impl<'a> StabilizationPoller<'a> {
    pub fn new(
        executor: &'a Executor,
        source: &'a dyn EndpointSource,
        config: PollerConfig,
    ) -> Self {
        Self {
            executor,
            source,
            config,
        }
    }

    /// Returns the first payload observed twice in a row, byte for byte.
    ///
    /// An empty payload never counts as stable, even when repeated: an
    /// exporter that has published nothing yet must be given another cycle.
    pub async fn poll_until_stable(&self, spec: &RequestSpec) -> Vec<u8> {
        let mut previous = self.fetch_until_success(spec).await;
        loop {
            let current = self.fetch_until_success(spec).await;
            if !current.is_empty() && current == previous {
                return current;
            }

            tracing::info!(
                "exporter is still updating or has not published anything yet, waiting {:?}...",
                self.config.settle_delay
            );
            previous = current;
            tokio::time::sleep(self.config.settle_delay).await;
        }
    }

    /// Scrapes until a call returns a consumed 2xx body. The endpoint is
    /// re-resolved on every iteration so rotated credentials and newly
    /// reachable targets are picked up without a restart.
    async fn fetch_until_success(&self, spec: &RequestSpec) -> Vec<u8> {
        loop {
            let endpoint = match self.source.endpoint().await {
                Ok(endpoint) => endpoint,
                Err(err) => {
                    tracing::warn!("failed to resolve scrape endpoint: {err}");
                    tracing::info!("retrying connection in {:?}...", self.config.retry_delay);
                    tokio::time::sleep(self.config.retry_delay).await;
                    continue;
                }
            };

            let mut body = Vec::new();
            let mut consumer = |chunk: &[u8]| -> anyhow::Result<()> {
                body.extend_from_slice(chunk);
                Ok(())
            };
            let status = self
                .executor
                .execute(&endpoint, spec, Some(&mut consumer))
                .await;

            if status.code == 200 {
                return body;
            }

            tracing::warn!("received status code {}", status.code);
            tracing::warn!("body: {}", status.message);
            tracing::info!("retrying connection in {:?}...", self.config.retry_delay);
            tokio::time::sleep(self.config.retry_delay).await;
        }
    }
}
