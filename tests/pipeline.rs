//! End-to-end pipeline behavior against a scripted in-memory store:
//! batch splitting, mapper drops, partial-rejection handoff, retry
//! termination, and aggregate hard-failure reporting.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use redis_series_sink::{
    RemoteStorage, RetryPolicy, Sample, SeriesSink, SeriesStore, SinkConfig, StoreError,
    WriteRequest, METRIC_NAME_LABEL,
};

// ─── Scripted store ──────────────────────────────────────────────

/// Reply for one `batch_put` call, consumed in order. When the script
/// runs dry, `default` applies.
#[derive(Debug, Clone)]
enum Reply {
    /// Accept every item.
    Accept,
    /// Reject the first `n` items (clamped to the batch size).
    Reject(usize),
    /// Hard-fail the whole call.
    Fail(&'static str),
}

struct ScriptedStore {
    script: Mutex<VecDeque<Reply>>,
    default: Reply,
    /// Size of every batch_put call, in order.
    batch_calls: Mutex<Vec<usize>>,
    put_calls: Mutex<usize>,
}

impl ScriptedStore {
    fn new(script: Vec<Reply>, default: Reply) -> Self {
        Self {
            script: Mutex::new(script.into()),
            default,
            batch_calls: Mutex::new(Vec::new()),
            put_calls: Mutex::new(0),
        }
    }

    fn batch_calls(&self) -> Vec<usize> {
        self.batch_calls.lock().clone()
    }
}

#[async_trait]
impl SeriesStore for ScriptedStore {
    async fn put(&self, _req: &WriteRequest) -> Result<(), StoreError> {
        *self.put_calls.lock() += 1;
        Ok(())
    }

    async fn batch_put(&self, reqs: &[WriteRequest]) -> Result<Vec<WriteRequest>, StoreError> {
        self.batch_calls.lock().push(reqs.len());
        let reply = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());
        match reply {
            Reply::Accept => Ok(Vec::new()),
            Reply::Reject(n) => Ok(reqs[..n.min(reqs.len())].to_vec()),
            Reply::Fail(msg) => Err(StoreError::Unavailable(msg.into())),
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

fn sample(metric: &str, host: usize, value: f64) -> Sample {
    let mut labels = HashMap::new();
    labels.insert(METRIC_NAME_LABEL.to_owned(), metric.to_owned());
    labels.insert("host".to_owned(), format!("web-{host}"));
    Sample {
        labels,
        timestamp: Utc.with_ymd_and_hms(2026, 8, 24, 12, 0, 0).unwrap(),
        value,
    }
}

fn samples(metric: &str, n: usize) -> Vec<Sample> {
    (0..n).map(|i| sample(metric, i, i as f64)).collect()
}

fn sink(store: ScriptedStore, retry: RetryPolicy) -> SeriesSink<ScriptedStore> {
    let mut config = SinkConfig::new("metrics");
    config.retry = retry;
    SeriesSink::new(store, config)
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        base_backoff_ms: 100,
        max_elapsed_secs: 30,
        max_units: 8,
    }
}

// ─── Batching across the write call ──────────────────────────────

#[tokio::test]
async fn thirty_samples_become_two_calls_and_no_retry_units() {
    let store = ScriptedStore::new(vec![], Reply::Accept);
    let sink = sink(store, fast_retry());

    let summary = sink.write(&samples("cpu_usage", 30)).await.unwrap();

    assert_eq!(summary.accepted, 30);
    assert_eq!(summary.dropped, 0);
    assert_eq!(summary.retrying, 0);
    assert_eq!(sink.store().batch_calls(), vec![25, 5]);
    assert_eq!(sink.retry_stats().units_spawned, 0);
}

#[tokio::test]
async fn empty_input_makes_no_backend_calls() {
    let store = ScriptedStore::new(vec![], Reply::Accept);
    let sink = sink(store, fast_retry());

    let summary = sink.write(&[]).await.unwrap();

    assert_eq!(summary.accepted, 0);
    assert!(summary.batches.is_empty());
    assert!(sink.store().batch_calls().is_empty());
}

// ─── Mapper drops ────────────────────────────────────────────────

#[tokio::test]
async fn unmappable_sample_is_dropped_without_backend_calls() {
    let store = ScriptedStore::new(vec![], Reply::Accept);
    let sink = sink(store, fast_retry());

    let summary = sink.write(&[sample("cpu_usage", 0, f64::NAN)]).await.unwrap();

    assert_eq!(summary.accepted, 0);
    assert_eq!(summary.dropped, 1);
    assert!(sink.store().batch_calls().is_empty());
}

#[tokio::test]
async fn one_bad_sample_does_not_abort_the_batch() {
    let store = ScriptedStore::new(vec![], Reply::Accept);
    let sink = sink(store, fast_retry());

    let mut input = samples("cpu_usage", 10);
    input[4].labels.remove(METRIC_NAME_LABEL);

    let summary = sink.write(&input).await.unwrap();

    assert_eq!(summary.accepted, 9);
    assert_eq!(summary.dropped, 1);
    assert_eq!(sink.store().batch_calls(), vec![9]);
}

// ─── Partial rejection and background retry ──────────────────────

#[tokio::test(start_paused = true)]
async fn partial_rejection_spawns_one_unit_and_write_still_succeeds() {
    let store = ScriptedStore::new(vec![Reply::Reject(3)], Reply::Accept);
    let sink = sink(store, fast_retry());

    let summary = sink.write(&samples("cpu_usage", 5)).await.unwrap();

    // The caller sees success immediately, with the rejected subset
    // accounted as retrying.
    assert_eq!(summary.retrying, 3);
    assert_eq!(summary.batches.len(), 1);
    assert_eq!(summary.batches[0].written, 2);
    assert_eq!(sink.retry_stats().units_spawned, 1);

    sink.drain_retries().await;

    // Exactly one resubmission carrying exactly the 3 rejected items.
    assert_eq!(sink.store().batch_calls(), vec![5, 3]);
    let stats = sink.retry_stats();
    assert_eq!(stats.units_recovered, 1);
    assert_eq!(stats.items_recovered, 3);
    assert_eq!(stats.units_in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn retry_continues_with_the_remainder_under_one_unit() {
    // First call rejects 4; the retry attempt takes 2 and rejects 2;
    // the next attempt takes the rest.
    let store = ScriptedStore::new(
        vec![Reply::Reject(4), Reply::Reject(2), Reply::Accept],
        Reply::Accept,
    );
    let sink = sink(store, fast_retry());

    sink.write(&samples("cpu_usage", 6)).await.unwrap();
    sink.drain_retries().await;

    assert_eq!(sink.store().batch_calls(), vec![6, 4, 2]);
    let stats = sink.retry_stats();
    assert_eq!(stats.units_spawned, 1);
    assert_eq!(stats.units_recovered, 1);
    assert_eq!(stats.items_recovered, 4);
}

#[tokio::test(start_paused = true)]
async fn retry_stops_once_the_elapsed_budget_is_exhausted() {
    // The backend never accepts the rejected pair.
    let store = ScriptedStore::new(vec![Reply::Reject(2)], Reply::Reject(2));
    let policy = RetryPolicy {
        base_backoff_ms: 100,
        max_elapsed_secs: 1,
        max_units: 8,
    };
    let sink = sink(store, policy);

    sink.write(&samples("cpu_usage", 5)).await.unwrap();
    sink.drain_retries().await;

    let stats = sink.retry_stats();
    assert_eq!(stats.units_exhausted, 1);
    assert_eq!(stats.items_dropped, 2);
    assert_eq!(stats.units_in_flight, 0);

    // Backoff doubling from 100ms against a 1s budget allows only a
    // handful of attempts, and none start after the budget.
    assert!(stats.attempts >= 1);
    assert!(stats.attempts <= 4, "attempts = {}", stats.attempts);
}

#[tokio::test(start_paused = true)]
async fn hard_failures_during_retry_do_not_kill_the_unit() {
    let store = ScriptedStore::new(
        vec![Reply::Reject(2), Reply::Fail("transient outage"), Reply::Accept],
        Reply::Accept,
    );
    let sink = sink(store, fast_retry());

    sink.write(&samples("cpu_usage", 5)).await.unwrap();
    sink.drain_retries().await;

    // The failed attempt is retried; the unit still recovers.
    assert_eq!(sink.store().batch_calls(), vec![5, 2, 2]);
    assert_eq!(sink.retry_stats().units_recovered, 1);
}

// ─── Hard failures on the write path ─────────────────────────────

#[tokio::test]
async fn aggregate_error_preserves_every_hard_failure() {
    // 60 samples → batches of 25, 25, 10. First and last fail hard.
    let store = ScriptedStore::new(
        vec![
            Reply::Fail("node down"),
            Reply::Accept,
            Reply::Fail("still down"),
        ],
        Reply::Accept,
    );
    let sink = sink(store, fast_retry());

    let err = sink.write(&samples("cpu_usage", 60)).await.unwrap_err();

    assert_eq!(err.batches, 3);
    assert_eq!(err.failures.len(), 2);
    assert_eq!(err.failures[0].batch, 0);
    assert_eq!(err.failures[0].items, 25);
    assert_eq!(err.failures[1].batch, 2);
    assert_eq!(err.failures[1].items, 10);

    let rendered = format!("{err}: {}", err.failures[1]);
    assert!(rendered.contains("2 of 3 batches failed"));
    assert!(rendered.contains("still down"));
}

#[tokio::test]
async fn hard_failure_of_one_batch_does_not_stop_later_batches() {
    let store = ScriptedStore::new(vec![Reply::Fail("node down")], Reply::Accept);
    let sink = sink(store, fast_retry());

    let err = sink.write(&samples("cpu_usage", 30)).await.unwrap_err();

    // Both batches were attempted; the second one landed.
    assert_eq!(sink.store().batch_calls(), vec![25, 5]);
    assert_eq!(err.failures.len(), 1);
}

// ─── Inbound capability surface ──────────────────────────────────

#[tokio::test]
async fn declared_surface_answers_fixed_values() {
    let store = ScriptedStore::new(vec![], Reply::Accept);
    let sink = sink(store, fast_retry());

    assert_eq!(sink.name(), "redis");
    assert!(sink.health_check().await.is_ok());
    let response = sink.read(&Default::default()).await;
    assert!(response.results.is_empty());
}
