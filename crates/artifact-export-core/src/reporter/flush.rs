// Bulk delivery of one pending batch, with stats bookkeeping

use std::time::Instant;
use tracing::debug;

use crate::document::Document;
use crate::index::IndexKind;
use crate::indexer::BulkIndexer;
use crate::stats::ExportStats;

pub(crate) struct FlushTarget<'a> {
    pub indexer: &'a dyn BulkIndexer,
    pub stats: &'a ExportStats,
    pub base_url: &'a str,
    pub index: &'a str,
    pub kind: IndexKind,
}

#[derive(Debug, Default)]
pub(crate) struct Delivery {
    pub succeeded: usize,
    /// Documents the cluster did not accept, in submission order.
    pub failed: Vec<Document>,
}

impl Delivery {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sends `documents` as one bulk request and records the result in stats.
pub(crate) async fn deliver_bulk(target: &FlushTarget<'_>, documents: &[Document]) -> Delivery {
    let started = Instant::now();
    let result = target
        .indexer
        .push_bulk(target.base_url, target.index, documents)
        .await;
    target.stats.record_last_push(target.kind, started.elapsed());

    let delivery = match result {
        Ok(outcome) => {
            let failed: Vec<Document> = outcome
                .failed_positions(documents.len())
                .into_iter()
                .map(|pos| documents[pos].clone())
                .collect();
            let succeeded = documents.len() - failed.len();
            if !failed.is_empty() {
                let message = outcome
                    .summary
                    .unwrap_or_else(|| format!("Bulk had {} failure(s)", failed.len()));
                target.stats.record_last_error(target.kind, &message);
            }
            Delivery { succeeded, failed }
        }
        Err(e) => {
            target.stats.record_last_error(target.kind, &e.to_string());
            Delivery {
                succeeded: 0,
                failed: documents.to_vec(),
            }
        }
    };

    target.stats.record_success(target.kind, delivery.succeeded as u64);
    target.stats.record_failure(target.kind, delivery.failed.len() as u64);
    debug!(
        index = target.index,
        submitted = documents.len(),
        succeeded = delivery.succeeded,
        failed = delivery.failed.len(),
        "Bulk flush delivered"
    );
    delivery
}
