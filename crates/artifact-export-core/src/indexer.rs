// Bulk indexing client boundary
//
// The HTTP client lives outside this crate; reporters, the retry
// coordinator and the traffic sink only see this trait.

use async_trait::async_trait;

use crate::document::Document;
use crate::error::IndexError;

/// Result of a bulk request that reached the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Documents the cluster accepted.
    pub succeeded: usize,
    /// Positions (in the submitted slice) of rejected documents, when known.
    pub failed: Vec<usize>,
    /// Short description of the failures, if the client produced one.
    pub summary: Option<String>,
}

impl BulkOutcome {
    pub fn all_succeeded(count: usize) -> Self {
        Self {
            succeeded: count,
            ..Self::default()
        }
    }

    pub fn partial(succeeded: usize, failed: Vec<usize>, summary: impl Into<String>) -> Self {
        Self {
            succeeded,
            failed,
            summary: Some(summary.into()),
        }
    }

    pub fn is_complete(&self, submitted: usize) -> bool {
        self.succeeded >= submitted
    }

    /// Positions to treat as failed out of `submitted` documents.
    ///
    /// Uses the reported positions when present; otherwise assumes the
    /// trailing documents after the successful prefix failed.
    pub fn failed_positions(&self, submitted: usize) -> Vec<usize> {
        if !self.failed.is_empty() {
            let mut positions: Vec<usize> = self
                .failed
                .iter()
                .copied()
                .filter(|&pos| pos < submitted)
                .collect();
            positions.sort_unstable();
            positions.dedup();
            positions
        } else if self.succeeded < submitted {
            (self.succeeded..submitted).collect()
        } else {
            Vec::new()
        }
    }
}

/// Client for the search cluster's bulk and single-document APIs.
///
/// `Ok` with `succeeded < len` is a partial failure; `Err` means nothing
/// was indexed.
#[async_trait]
pub trait BulkIndexer: Send + Sync {
    async fn push_bulk(
        &self,
        base_url: &str,
        index: &str,
        documents: &[Document],
    ) -> Result<BulkOutcome, IndexError>;

    async fn push_document(
        &self,
        base_url: &str,
        index: &str,
        document: &Document,
    ) -> Result<(), IndexError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_positions_prefer_reported_positions() {
        let outcome = BulkOutcome::partial(2, vec![3, 1, 1, 9], "2 rejected");
        assert_eq!(outcome.failed_positions(4), vec![1, 3]);
        assert!(!outcome.is_complete(4));
    }

    #[test]
    fn failed_positions_fall_back_to_tail() {
        let outcome = BulkOutcome {
            succeeded: 3,
            ..BulkOutcome::default()
        };
        assert_eq!(outcome.failed_positions(5), vec![3, 4]);
        assert!(BulkOutcome::all_succeeded(5).failed_positions(5).is_empty());
        assert!(BulkOutcome::all_succeeded(5).is_complete(5));
    }
}
