use tracing::{debug, warn};

use crate::store::{SeriesStore, StoreError, WriteRequest};

/// Outcome of submitting one batch: either everything landed, or the
/// backend kept a subset back for the retry path. A hard failure of the
/// call itself surfaces as the `Err` side instead.
#[derive(Debug)]
pub enum Submission {
    AllWritten {
        count: usize,
    },
    Partial {
        written: usize,
        unprocessed: Vec<WriteRequest>,
    },
}

/// One backend call for one non-empty batch.
pub async fn submit<S: SeriesStore>(
    store: &S,
    batch: Vec<WriteRequest>,
) -> Result<Submission, StoreError> {
    debug_assert!(!batch.is_empty(), "empty batches are never submitted");
    let total = batch.len();

    let unprocessed = store.batch_put(&batch).await?;
    if unprocessed.is_empty() {
        debug!(items = total, "batch fully accepted");
        Ok(Submission::AllWritten { count: total })
    } else {
        let written = total.saturating_sub(unprocessed.len());
        warn!(
            items = total,
            written,
            unprocessed = unprocessed.len(),
            "batch partially accepted, handing remainder to retry"
        );
        Ok(Submission::Partial {
            written,
            unprocessed,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────
