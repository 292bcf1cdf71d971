use async_trait::async_trait;
use thiserror::Error;

// ─── Wire types ──────────────────────────────────────────────────

/// One unit of work against the backend: a record addressed by its
/// partition and member key, carrying the encoded attribute payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub partition_id: String,
    pub member: String,
    pub payload: String,
}

// ─── Errors ──────────────────────────────────────────────────────

/// A backend call that failed outright. Capacity-limited partial
/// rejection is *not* an error; it comes back through the `Ok` side of
/// [`SeriesStore::batch_put`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend request failed: {0}")]
    Request(#[from] redis::RedisError),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

// ─── Store contract ──────────────────────────────────────────────

/// The partitioned store the sink writes into.
///
/// `batch_put` accepts up to the configured per-call item limit and
/// returns the subset the backend could not accept this time around —
/// an expected response under capacity pressure, not a failure.
#[async_trait]
pub trait SeriesStore: Send + Sync + 'static {
    /// Single-item write primitive.
    async fn put(&self, req: &WriteRequest) -> Result<(), StoreError>;

    /// Bounded batch write primitive. `Ok(unprocessed)` lists the items
    /// the backend rejected for capacity reasons; `Err` means the call
    /// itself failed and nothing can be said about individual items.
    async fn batch_put(&self, reqs: &[WriteRequest]) -> Result<Vec<WriteRequest>, StoreError>;
}
