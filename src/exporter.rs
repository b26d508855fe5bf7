use futures::stream::{self, StreamExt};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::metrics::PipelineMetrics;
use crate::providers::bitbucket::BitbucketProvider;

/// Polls the latest pipeline of a fixed set of repositories and publishes it.
pub struct Exporter {
    provider: BitbucketProvider,
    metrics: Arc<PipelineMetrics>,
    repositories: Vec<String>,
    interval: Duration,
    max_concurrent_fetches: usize,
}

impl Exporter {
    /// # Arguments
    ///
    /// * `repositories` - Slugs to poll; fixed for the exporter's lifetime
    /// * `interval` - Pause between the end of one cycle and the start of the next
    /// * `max_concurrent_fetches` - In-flight pipeline requests per cycle (`1` is sequential)
    pub fn new(
        provider: BitbucketProvider,
        metrics: Arc<PipelineMetrics>,
        repositories: Vec<String>,
        interval: Duration,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            provider,
            metrics,
            repositories,
            interval,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    /// Fetch every repository once and record the results.
    ///
    /// A repository whose fetch fails or that has no pipelines is left untouched.
    /// Results are applied in repository order whatever the concurrency.
    pub async fn update_metrics(&self) {
        let mut updated = 0;
        let mut empty = 0;
        let mut failed = 0;

        let mut outcomes = stream::iter(&self.repositories)
            .map(|repository| async move {
                (repository, self.provider.latest_pipeline(repository).await)
            })
            .buffered(self.max_concurrent_fetches);

        while let Some((repository, outcome)) = outcomes.next().await {
            match outcome {
                Ok(Some(execution)) => {
                    self.metrics.record(repository, &execution);
                    updated += 1;
                }
                Ok(None) => {
                    if self.metrics.is_published(repository) {
                        debug!("Keeping previous metrics for {repository}");
                    }
                    empty += 1;
                }
                Err(_) => {
                    if self.metrics.is_published(repository) {
                        debug!("Keeping stale metrics for {repository}");
                    }
                    failed += 1;
                }
            }
        }

        info!(
            "Metrics cycle finished: {updated} updated, {empty} without pipelines, {failed} failed"
        );
    }

    /// Run update cycles until `shutdown` turns `true` or its sender is dropped.
    ///
    /// The signal is observed while sleeping between cycles; a cycle in progress
    /// always completes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Polling {} repositories every {}s",
            self.repositories.len(),
            self.interval.as_secs()
        );

        loop {
            self.update_metrics().await;

            let stop = *shutdown.borrow();
            if stop {
                break;
            }

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {}
            }

            let stop = *shutdown.borrow();
            if stop || shutdown.has_changed().is_err() {
                break;
            }
        }

        info!("Polling stopped");
    }
}
