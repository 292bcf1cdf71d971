use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

/// Reserved label carrying the measurement name (Prometheus convention).
pub const METRIC_NAME_LABEL: &str = "__name__";

/// One measurement observation as received from the ingestion caller.
///
/// The metric name travels inside `labels` under [`METRIC_NAME_LABEL`],
/// exactly as remote-write senders ship it. Immutable once received.
#[derive(Debug, Clone, Deserialize)]
pub struct Sample {
    /// Label set, including the reserved metric-name label.
    pub labels: HashMap<String, String>,
    /// Observation time, full precision.
    pub timestamp: DateTime<Utc>,
    /// Observed value.
    pub value: f64,
}

impl Sample {
    /// The measurement name, if the reserved label is present.
    pub fn metric(&self) -> Option<&str> {
        self.labels.get(METRIC_NAME_LABEL).map(String::as_str)
    }
}
