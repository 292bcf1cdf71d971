//! Batched time-series write sink backed by Redis.
//!
//! Samples flow through a four-stage pipeline: the record mapper
//! normalizes each sample into a partitioned record, the batcher groups
//! records up to the backend's per-call item limit, the submitter sends
//! one batch per backend call, and the retry coordinator re-drives any
//! partially rejected subset in the background with bounded exponential
//! backoff. The caller's `write` returns as soon as the initial
//! submissions complete; partial rejections never block it.

pub mod batcher;
pub mod config;
pub mod record;
pub mod redis_store;
pub mod retry;
pub mod sample;
pub mod server;
pub mod sink;
pub mod store;
pub mod submitter;

pub use batcher::Batcher;
pub use config::{ConfigError, RetryPolicy, SinkConfig};
pub use record::{MapError, Record};
pub use redis_store::{connect, RedisStore};
pub use retry::{RetryCoordinator, RetrySnapshot};
pub use sample::{Sample, METRIC_NAME_LABEL};
pub use sink::{
    BatchFailure, BatchResult, ReadRequest, ReadResponse, RemoteStorage, SeriesSink, WriteError,
    WriteSummary,
};
pub use store::{SeriesStore, StoreError, WriteRequest};
pub use submitter::{submit, Submission};
