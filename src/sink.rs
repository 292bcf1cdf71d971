use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, warn};

use crate::batcher::Batcher;
use crate::config::SinkConfig;
use crate::record::Record;
use crate::retry::{RetryCoordinator, RetrySnapshot};
use crate::sample::Sample;
use crate::store::{SeriesStore, StoreError, WriteRequest};
use crate::submitter::{self, Submission};

// ─── Results ─────────────────────────────────────────────────────

/// What one `write` call did, batch by batch.
///
/// `Ok` does not mean every sample is durable yet: items under
/// background retry may still exhaust their budget and be dropped.
/// It does mean no submission hard-failed.
#[derive(Debug, Default, Serialize)]
pub struct WriteSummary {
    /// Samples that mapped cleanly and entered a batch.
    pub accepted: usize,
    /// Samples the mapper could not serialize (logged and skipped).
    pub dropped: usize,
    /// Items handed to the background retry path.
    pub retrying: usize,
    pub batches: Vec<BatchResult>,
}

/// Per-batch accounting for a successful submission.
#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub items: usize,
    pub written: usize,
    pub retrying: usize,
}

/// Aggregate of every hard submission failure in one `write` call.
/// Nothing is swallowed: each failed batch keeps its cause.
#[derive(Debug, Error)]
#[error("{} of {batches} batches failed", .failures.len())]
pub struct WriteError {
    /// Total batches the call submitted (failed or not).
    pub batches: usize,
    pub failures: Vec<BatchFailure>,
}

#[derive(Debug, Error)]
#[error("batch {batch} ({items} items): {source}")]
pub struct BatchFailure {
    /// Zero-based position of the batch within the call.
    pub batch: usize,
    pub items: usize,
    pub source: StoreError,
}

// ─── Read surface (declared, intentionally unimplemented) ────────

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ReadRequest {
    #[serde(default)]
    pub queries: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ReadResponse {
    pub results: Vec<serde_json::Value>,
}

// ─── Storage capability set ──────────────────────────────────────

/// The capability set the surrounding ingestion framework expects from
/// a remote storage backend.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    async fn write(&self, samples: &[Sample]) -> Result<WriteSummary, WriteError>;

    /// Fixed backend identifier for diagnostics/registration.
    fn name(&self) -> &'static str;

    /// Declared to satisfy the capability set; this backend serves no
    /// queries and always answers empty.
    async fn read(&self, request: &ReadRequest) -> ReadResponse;

    /// Declared to satisfy the capability set; always healthy.
    async fn health_check(&self) -> Result<(), StoreError>;
}

// ─── SeriesSink ──────────────────────────────────────────────────

/// The write pipeline: map samples to records, group them into bounded
/// batches, submit each batch once, and hand partial rejections to the
/// background retry coordinator.
pub struct SeriesSink<S: SeriesStore> {
    store: Arc<S>,
    config: SinkConfig,
    retries: RetryCoordinator<S>,
}

impl<S: SeriesStore> SeriesSink<S> {
    pub fn new(store: S, config: SinkConfig) -> Self {
        let store = Arc::new(store);
        let retries = RetryCoordinator::new(Arc::clone(&store), config.retry.clone());
        Self {
            store,
            config,
            retries,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn retry_stats(&self) -> RetrySnapshot {
        self.retries.stats()
    }

    /// Wait for in-flight retry units without interrupting them.
    pub async fn drain_retries(&self) {
        self.retries.drain().await;
    }

    /// Cancel in-flight retry units and wait for them to exit.
    pub async fn shutdown(&self) {
        self.retries.shutdown().await;
    }

    /// Submit one full or trailing batch and fold the outcome into the
    /// running summary. Hard failures are collected, never last-wins.
    async fn dispatch(
        &self,
        batch: Vec<WriteRequest>,
        summary: &mut WriteSummary,
        failures: &mut Vec<BatchFailure>,
    ) {
        let index = summary.batches.len() + failures.len();
        let items = batch.len();

        match submitter::submit(&*self.store, batch).await {
            Ok(Submission::AllWritten { count }) => {
                summary.batches.push(BatchResult {
                    items,
                    written: count,
                    retrying: 0,
                });
            }
            Ok(Submission::Partial {
                written,
                unprocessed,
            }) => {
                summary.retrying += unprocessed.len();
                summary.batches.push(BatchResult {
                    items,
                    written,
                    retrying: unprocessed.len(),
                });
                self.retries.spawn(unprocessed);
            }
            Err(e) => {
                error!(batch = index, items, error = %e, "batch submission failed");
                failures.push(BatchFailure {
                    batch: index,
                    items,
                    source: e,
                });
            }
        }
    }
}

#[async_trait]
impl<S: SeriesStore> RemoteStorage for SeriesSink<S> {
    async fn write(&self, samples: &[Sample]) -> Result<WriteSummary, WriteError> {
        let mut summary = WriteSummary::default();
        let mut failures = Vec::new();
        let mut batcher = Batcher::new(self.config.max_batch_size);

        for sample in samples {
            let request = Record::from_sample(sample).and_then(Record::into_request);
            match request {
                Ok(req) => {
                    summary.accepted += 1;
                    if let Some(batch) = batcher.push(req) {
                        self.dispatch(batch, &mut summary, &mut failures).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "dropping unmappable sample");
                    summary.dropped += 1;
                }
            }
        }

        if let Some(batch) = batcher.finish() {
            self.dispatch(batch, &mut summary, &mut failures).await;
        }

        if failures.is_empty() {
            Ok(summary)
        } else {
            Err(WriteError {
                batches: summary.batches.len() + failures.len(),
                failures,
            })
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }

    async fn read(&self, _request: &ReadRequest) -> ReadResponse {
        ReadResponse::default()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
