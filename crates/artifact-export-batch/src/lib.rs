// artifact-export-batch - Flush decisions for bulk index requests
//
// Accumulates candidate documents and hands back batches bounded by
// document count and estimated payload size. The assembler never performs
// I/O itself; callers send each returned batch and await the result before
// pushing more, which keeps flushes of one cycle strictly ordered.

use serde_json::Value;

mod estimate;
mod pending_batch;

pub use estimate::estimate_bytes;
pub use pending_batch::PendingBatch;

/// Default number of documents per bulk request.
pub const DEFAULT_MAX_DOCS: usize = 100;

/// Default estimated payload per bulk request (5 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_docs: usize,
    pub max_bytes: u64,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_docs: DEFAULT_MAX_DOCS,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// Groups a stream of documents into count- and size-bounded batches.
///
/// A batch is handed back when it reaches `max_docs` documents or
/// `max_bytes` estimated bytes. If the next document would push a non-empty
/// batch past `max_bytes`, the current batch is handed back first, so a
/// batch only exceeds the byte cap when a single document does on its own.
#[derive(Debug)]
pub struct BatchAssembler<K> {
    limits: BatchLimits,
    pending: PendingBatch<K>,
}

impl<K> BatchAssembler<K> {
    pub fn new(limits: BatchLimits) -> Self {
        Self {
            limits,
            pending: Self::fresh(&limits),
        }
    }

    pub fn limits(&self) -> &BatchLimits {
        &self.limits
    }

    /// Adds a document and returns every batch that became ready, oldest first.
    ///
    /// Usually empty; at most two batches are returned (the batch displaced
    /// by an oversized document, then that document on its own).
    pub fn push(&mut self, key: K, document: Value) -> Vec<PendingBatch<K>> {
        let approx_bytes = estimate_bytes(&document);
        let mut ready = Vec::new();

        if self.pending.would_overflow(approx_bytes, &self.limits) {
            ready.push(self.take());
        }

        self.pending.add(key, document, approx_bytes);

        if self.pending.should_flush(&self.limits) {
            ready.push(self.take());
        }

        ready
    }

    /// Returns the final partial batch, if anything is left.
    pub fn finish(&mut self) -> Option<PendingBatch<K>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_bytes(&self) -> u64 {
        self.pending.total_bytes()
    }

    fn take(&mut self) -> PendingBatch<K> {
        let fresh = Self::fresh(&self.limits);
        std::mem::replace(&mut self.pending, fresh)
    }

    fn fresh(limits: &BatchLimits) -> PendingBatch<K> {
        PendingBatch::with_capacity(limits.max_docs.min(DEFAULT_MAX_DOCS))
    }
}
