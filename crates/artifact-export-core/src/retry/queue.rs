// Bounded per-index retry queue
//
// Each index gets its own FIFO capped at `capacity`. When a queue is full the
// incoming document is rejected; queued documents are never evicted.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::document::Document;

#[derive(Debug)]
pub struct RetryQueue {
    capacity: usize,
    queues: Mutex<HashMap<String, VecDeque<Document>>>,
}

impl RetryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queues: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueues one document; `false` if the index's queue is full.
    pub fn offer(&self, index: &str, document: Document) -> bool {
        let mut queues = self.queues.lock();
        let queue = queues.entry(index.to_string()).or_default();
        if queue.len() >= self.capacity {
            debug!(index, capacity = self.capacity, "Retry queue full; dropping document");
            return false;
        }
        queue.push_back(document);
        true
    }

    /// Enqueues documents in order until the queue fills; returns how many were accepted.
    /// Documents after the first rejection are dropped.
    pub fn offer_all<I>(&self, index: &str, documents: I) -> usize
    where
        I: IntoIterator<Item = Document>,
    {
        let mut queues = self.queues.lock();
        let queue = queues.entry(index.to_string()).or_default();
        let mut accepted = 0;
        let mut dropped = 0;
        for document in documents {
            if queue.len() < self.capacity {
                queue.push_back(document);
                accepted += 1;
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(index, accepted, dropped, "Retry queue full; dropping documents");
        }
        accepted
    }

    /// Removes and returns up to `max` of the oldest documents for `index`.
    pub fn poll_batch(&self, index: &str, max: usize) -> Vec<Document> {
        let mut queues = self.queues.lock();
        match queues.get_mut(index) {
            Some(queue) => {
                let take = max.min(queue.len());
                queue.drain(..take).collect()
            }
            None => Vec::new(),
        }
    }

    pub fn size(&self, index: &str) -> usize {
        self.queues.lock().get(index).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, index: &str) -> bool {
        self.size(index) == 0
    }

    pub fn total_size(&self) -> usize {
        self.queues.lock().values().map(VecDeque::len).sum()
    }

    pub fn all_empty(&self) -> bool {
        self.queues.lock().values().all(VecDeque::is_empty)
    }

    /// Names of indexes with queued documents, sorted.
    pub fn pending_indexes(&self) -> Vec<String> {
        let queues = self.queues.lock();
        let mut names: Vec<String> = queues
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn doc(n: u32) -> Document {
        json!({ "n": n })
    }

    #[test]
    fn offer_all_stops_at_capacity() {
        let queue = RetryQueue::new(2);
        assert_eq!(queue.offer_all("idx", vec![doc(1), doc(2), doc(3)]), 2);
        assert_eq!(queue.size("idx"), 2);

        assert!(!queue.offer("idx", doc(4)));
        assert_eq!(queue.size("idx"), 2);

        let drained = queue.poll_batch("idx", 10);
        assert_eq!(drained, vec![doc(1), doc(2)]);
    }

    #[test]
    fn poll_batch_returns_oldest_first() {
        let queue = RetryQueue::new(10);
        queue.offer_all("idx", vec![doc(1), doc(2), doc(3)]);

        assert_eq!(queue.poll_batch("idx", 2), vec![doc(1), doc(2)]);
        assert_eq!(queue.size("idx"), 1);
        assert_eq!(queue.poll_batch("idx", 2), vec![doc(3)]);
        assert!(queue.is_empty("idx"));
    }

    #[test]
    fn unknown_index_is_empty() {
        let queue = RetryQueue::new(10);
        assert!(queue.poll_batch("missing", 5).is_empty());
        assert_eq!(queue.size("missing"), 0);
        assert!(queue.is_empty("missing"));
        assert!(queue.all_empty());
    }

    #[test]
    fn indexes_are_independent() {
        let queue = RetryQueue::new(1);
        assert!(queue.offer("a", doc(1)));
        assert!(queue.offer("b", doc(2)));
        assert!(!queue.offer("a", doc(3)));

        assert_eq!(queue.total_size(), 2);
        assert_eq!(queue.pending_indexes(), vec!["a", "b"]);

        queue.poll_batch("a", 1);
        assert_eq!(queue.pending_indexes(), vec!["b"]);
        assert!(!queue.all_empty());
    }

    #[test]
    fn concurrent_offers_never_exceed_capacity() {
        let queue = Arc::new(RetryQueue::new(100));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    (0..50).filter(|i| queue.offer("idx", doc(t * 100 + i))).count()
                })
            })
            .collect();

        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(accepted, 100);
        assert_eq!(queue.size("idx"), 100);
    }
}
