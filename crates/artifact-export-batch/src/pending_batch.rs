// Pending batch accumulation
//
// Holds candidate documents (and their dedup keys) until the assembler
// decides to hand them to the indexing client.

use serde_json::Value;

use crate::BatchLimits;

/// Ordered documents awaiting a bulk request, plus their running size estimate.
#[derive(Debug)]
pub struct PendingBatch<K> {
    keys: Vec<K>,
    documents: Vec<Value>,
    total_bytes: u64,
}

impl<K> PendingBatch<K> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
            documents: Vec::with_capacity(capacity),
            total_bytes: 0,
        }
    }

    pub(crate) fn add(&mut self, key: K, document: Value, approx_bytes: u64) {
        self.keys.push(key);
        self.documents.push(document);
        self.total_bytes = self.total_bytes.saturating_add(approx_bytes);
    }

    pub(crate) fn should_flush(&self, limits: &BatchLimits) -> bool {
        self.documents.len() >= limits.max_docs || self.total_bytes >= limits.max_bytes
    }

    /// True when adding `approx_bytes` more would push a non-empty batch past the byte cap.
    pub(crate) fn would_overflow(&self, approx_bytes: u64, limits: &BatchLimits) -> bool {
        !self.documents.is_empty() && self.total_bytes.saturating_add(approx_bytes) > limits.max_bytes
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn documents(&self) -> &[Value] {
        &self.documents
    }

    /// Splits the batch into its keys and documents, both in insertion order.
    pub fn into_parts(self) -> (Vec<K>, Vec<Value>) {
        (self.keys, self.documents)
    }
}
