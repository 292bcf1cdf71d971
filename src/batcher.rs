use crate::store::WriteRequest;

/// Accumulates write requests into groups that never exceed the
/// backend's per-call item limit.
///
/// `push` hands back a full group the moment the limit is reached;
/// `finish` hands back whatever trailing partial group remains. An
/// empty group is never emitted, and concatenating all emitted groups
/// in order reproduces the input sequence exactly.
pub struct Batcher {
    limit: usize,
    buf: Vec<WriteRequest>,
}

impl Batcher {
    /// `limit` must be at least 1.
    pub fn new(limit: usize) -> Self {
        debug_assert!(limit > 0, "batch limit must be positive");
        Self {
            limit: limit.max(1),
            buf: Vec::with_capacity(limit),
        }
    }

    /// Append one request. Returns the current group when it fills up.
    pub fn push(&mut self, req: WriteRequest) -> Option<Vec<WriteRequest>> {
        self.buf.push(req);
        if self.buf.len() == self.limit {
            Some(std::mem::replace(
                &mut self.buf,
                Vec::with_capacity(self.limit),
            ))
        } else {
            None
        }
    }

    /// End of input: the trailing group, if any records are pending.
    pub fn finish(self) -> Option<Vec<WriteRequest>> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf)
        }
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

// ─── Tests ───────────────────────────────────────────────────────
