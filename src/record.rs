use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use thiserror::Error;

use crate::sample::{Sample, METRIC_NAME_LABEL};
use crate::store::WriteRequest;

/// Calendar-day suffix of the partition id, e.g. `20260824`.
const DATE_FORMAT: &str = "%Y%m%d";

// ─── Errors ──────────────────────────────────────────────────────

/// A sample that cannot be turned into a storable record.
///
/// Mapping failures never abort a batch: the caller logs the error and
/// skips the sample.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("sample has no {METRIC_NAME_LABEL} label")]
    MissingMetricName,

    #[error("value {0} has no attribute representation")]
    UnrepresentableValue(f64),

    #[error("record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

// ─── Record ──────────────────────────────────────────────────────

/// The persisted representation of one [`Sample`].
///
/// `partition_id` is a pure function of the metric name and the calendar
/// day of the timestamp, so all samples for one metric on one day
/// co-locate on the same partition.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub partition_id: String,
    pub metric: String,
    pub timestamp: DateTime<Utc>,
    /// Label set minus the reserved metric-name label (promoted to
    /// `metric` / `partition_id`, never duplicated here).
    pub labels: HashMap<String, String>,
    /// Value as its string representation.
    pub value: String,
}

impl Record {
    /// Pure transform of a sample into its persisted shape.
    pub fn from_sample(sample: &Sample) -> Result<Record, MapError> {
        let metric = sample.metric().ok_or(MapError::MissingMetricName)?;
        if !sample.value.is_finite() {
            return Err(MapError::UnrepresentableValue(sample.value));
        }

        let labels = sample
            .labels
            .iter()
            .filter(|(name, _)| name.as_str() != METRIC_NAME_LABEL)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Ok(Record {
            partition_id: format!("{}-{}", metric, sample.timestamp.format(DATE_FORMAT)),
            metric: metric.to_owned(),
            timestamp: sample.timestamp,
            labels,
            value: sample.value.to_string(),
        })
    }

    /// Wire-format request for this record: member key plus the JSON
    /// attribute encoding the backend stores.
    pub fn into_request(self) -> Result<WriteRequest, MapError> {
        let member = format!(
            "{}#{:016x}",
            self.timestamp.timestamp_micros(),
            label_fingerprint(&self.labels),
        );
        let payload = serde_json::to_string(&self)?;
        Ok(WriteRequest {
            partition_id: self.partition_id,
            member,
            payload,
        })
    }
}

/// Order-independent fingerprint of a label set, used to keep members
/// with identical timestamps but different labels distinct.
fn label_fingerprint(labels: &HashMap<String, String>) -> u64 {
    let mut pairs: Vec<_> = labels.iter().collect();
    pairs.sort();

    let mut hasher = DefaultHasher::new();
    for (name, value) in pairs {
        name.hash(&mut hasher);
        value.hash(&mut hasher);
    }
    hasher.finish()
}

// ─── Tests ───────────────────────────────────────────────────────
