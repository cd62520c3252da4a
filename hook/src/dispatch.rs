//! Concurrent batch dispatch.
//!
//! Every batch gets its own `send_batch` call. All calls are started together and joined only
//! once every one of them has settled, so a failing batch never short-circuits its siblings.

use futures::future::join_all;

use crate::{
    batching::OutboundMessage,
    queue::{FailedEntry, QueueSender},
};

#[derive(Debug, Clone, PartialEq, Eq)]
/// What happened to one batch.
pub enum DispatchOutcome {
    /// The queue answered; some entries may still have been refused.
    Settled {
        batch: usize,
        succeeded: Vec<String>,
        failed: Vec<FailedEntry>,
    },
    /// The request never got a per-entry answer.
    Rejected {
        batch: usize,
        size: usize,
        reason: String,
    },
}

impl DispatchOutcome {
    pub fn batch(&self) -> usize {
        match self {
            Self::Settled { batch, .. } | Self::Rejected { batch, .. } => *batch,
        }
    }
}

/// Send every batch to `queue_url` concurrently and collect one outcome per batch, in batch
/// order. No retries are attempted.
pub async fn dispatch_all(
    sender: &dyn QueueSender,
    queue_url: &str,
    batches: &[Vec<OutboundMessage>],
) -> Vec<DispatchOutcome> {
    let sends = batches.iter().enumerate().map(|(batch, messages)| async move {
        tracing::debug!(
            event = "queue_send_batch",
            batch,
            batch_size = messages.len(),
            "sending batch"
        );

        match sender.send_batch(queue_url, messages).await {
            Ok(out) => DispatchOutcome::Settled {
                batch,
                succeeded: out.successful,
                failed: out.failed,
            },
            Err(err) => DispatchOutcome::Rejected {
                batch,
                size: messages.len(),
                reason: format!("{err:#}"),
            },
        }
    });

    join_all(sends).await
}
