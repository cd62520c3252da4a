//! Reduces per-batch dispatch outcomes to a single summary.

use crate::{dispatch::DispatchOutcome, queue::FailedEntry};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub total_succeeded: usize,
    /// Refused entries, plus one for every rejected batch.
    pub total_failed: usize,
    pub rejected_batches: usize,
    pub failed_entries: Vec<FailedEntry>,
}

/// Fold dispatch outcomes into totals, logging every failure.
///
/// A batch whose send was rejected outright counts as a single failure regardless of how many
/// messages it carried. Refused entries inside an answered batch count one each.
pub fn aggregate(outcomes: &[DispatchOutcome]) -> DispatchSummary {
    let mut summary = DispatchSummary::default();

    for outcome in outcomes {
        match outcome {
            DispatchOutcome::Settled {
                batch,
                succeeded,
                failed,
            } => {
                summary.total_succeeded += succeeded.len();
                if failed.is_empty() {
                    continue;
                }

                summary.total_failed += failed.len();
                tracing::warn!(
                    event = "queue_entries_failed",
                    batch = *batch,
                    failed = failed.len(),
                    succeeded = succeeded.len(),
                    "queue refused batch entries"
                );
                for entry in failed {
                    tracing::warn!(
                        event = "queue_entry_failed",
                        batch = *batch,
                        id = %entry.id,
                        sender_fault = entry.sender_fault,
                        reason = %entry.reason(),
                        "queue refused entry"
                    );
                }
                summary.failed_entries.extend(failed.iter().cloned());
            }
            DispatchOutcome::Rejected {
                batch,
                size,
                reason,
            } => {
                summary.total_failed += 1;
                summary.rejected_batches += 1;
                tracing::error!(
                    event = "queue_batch_rejected",
                    batch = *batch,
                    batch_size = *size,
                    reason = %reason,
                    "error sending batch"
                );
            }
        }
    }

    summary
}
