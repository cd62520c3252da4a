//! Webhook payload → queue pipeline.
//!
//! normalize each event → build one message per event → cut into batches → dispatch all batches
//! concurrently → aggregate. Everything before dispatch is fallible as a whole; everything after
//! is recovered per batch.

use serde_json::Value;
use thiserror::Error;

use crate::{
    aggregate::{aggregate, DispatchSummary},
    batching::{chunk, BatchSizeError, OutboundMessage, MAX_BATCH_SIZE},
    dispatch::dispatch_all,
    event::InboundEvent,
    queue::QueueSender,
};

#[derive(Debug, Error)]
/// Failure while preparing messages, before any batch is sent.
pub enum PipelineError {
    #[error("encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("batching: {0}")]
    Batch(#[from] BatchSizeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Where and how messages are queued.
pub struct QueueTarget {
    pub queue_url: String,
    pub group_id: String,
}

/// Build one outbound message per event, in order.
pub fn build_messages(
    events: Vec<Value>,
    group_id: &str,
) -> Result<Vec<OutboundMessage>, PipelineError> {
    events
        .into_iter()
        .map(|value| {
            let event = InboundEvent::from_value(value);
            if let Some(kind) = event.event_type() {
                tracing::debug!(
                    event = "sendgrid_event",
                    kind = kind.as_str(),
                    category = ?kind.category(),
                    sg_event_id = event.event_id(),
                    "processing event"
                );
            } else {
                tracing::debug!(
                    event = "sendgrid_event",
                    sg_event_id = event.event_id(),
                    "processing event without type"
                );
            }
            OutboundMessage::from_event(&event, group_id).map_err(PipelineError::from)
        })
        .collect()
}

/// Build messages and cut them into transport-sized batches.
pub fn prepare_batches(
    events: Vec<Value>,
    group_id: &str,
) -> Result<Vec<Vec<OutboundMessage>>, PipelineError> {
    let messages = build_messages(events, group_id)?;
    Ok(chunk(messages, MAX_BATCH_SIZE)?)
}

/// Run a webhook delivery through the whole pipeline.
///
/// Returns `Err` only when messages could not be prepared. Once batches exist every one of them
/// is sent, and transport failures are reported in the summary instead.
pub async fn ingest(
    sender: &dyn QueueSender,
    target: &QueueTarget,
    events: Vec<Value>,
) -> Result<DispatchSummary, PipelineError> {
    let received = events.len();
    let batches = prepare_batches(events, &target.group_id)?;

    tracing::debug!(
        event = "batches_prepared",
        events = received,
        batches = batches.len(),
        "prepared batches"
    );

    let outcomes = dispatch_all(sender, &target.queue_url, &batches).await;
    let summary = aggregate(&outcomes);

    tracing::info!(
        event = "sendgrid_events_queued",
        events = received,
        batches = batches.len(),
        succeeded = summary.total_succeeded,
        failed = summary.total_failed,
        rejected_batches = summary.rejected_batches,
        "processed and sent {} SendGrid events to SQS, total failures: {}",
        summary.total_succeeded,
        summary.total_failed
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{BatchSendOutput, FailedEntry};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every batch and refuses entries with an empty id, the way SQS does.
    #[derive(Default)]
    struct RecordingSender {
        batches: Mutex<Vec<Vec<OutboundMessage>>>,
        fail_all: bool,
    }

    #[async_trait]
    impl QueueSender for RecordingSender {
        async fn send_batch(
            &self,
            _queue_url: &str,
            messages: &[OutboundMessage],
        ) -> anyhow::Result<BatchSendOutput> {
            self.batches.lock().unwrap().push(messages.to_vec());
            if self.fail_all {
                anyhow::bail!("network down");
            }

            let (ok, bad): (Vec<_>, Vec<_>) = messages.iter().partition(|m| !m.id.is_empty());
            Ok(BatchSendOutput {
                successful: ok.into_iter().map(|m| m.id.clone()).collect(),
                failed: bad
                    .into_iter()
                    .map(|m| FailedEntry {
                        id: m.id.clone(),
                        code: "InvalidBatchEntryId".to_string(),
                        message: Some("entry id must not be empty".to_string()),
                        sender_fault: true,
                    })
                    .collect(),
            })
        }
    }

    fn target() -> QueueTarget {
        QueueTarget {
            queue_url: "http://127.0.0.1:9324/000000000000/sendgrid-events.fifo".to_string(),
            group_id: "SendGridEvents".to_string(),
        }
    }

    fn full_event(i: usize) -> Value {
        json!({
            "event": "bounce",
            "timestamp": 1_700_000_000 + i,
            "reason": "550 5.1.1 unknown user",
            "status": "5.1.1",
            "ip": "192.0.2.1",
            "url": "https://example.com",
            "response": "550",
            "sendId": format!("send-{i}"),
            "sg_event_id": format!("evt-{i}"),
            "attempt": 1,
            "email": "someone@example.com"
        })
    }

    #[tokio::test]
    async fn empty_delivery_sends_nothing() {
        let sender = RecordingSender::default();
        let summary = ingest(&sender, &target(), vec![]).await.unwrap();

        assert_eq!(summary, DispatchSummary::default());
        assert!(sender.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fifteen_events_go_out_as_two_batches() {
        let sender = RecordingSender::default();
        let events = (0..15).map(full_event).collect();

        let summary = ingest(&sender, &target(), events).await.unwrap();

        assert_eq!(summary.total_succeeded, 15);
        assert_eq!(summary.total_failed, 0);

        let batches = sender.batches.lock().unwrap();
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 5]);

        let first = &batches[0][0];
        assert_eq!(first.id, "evt-0");
        assert_eq!(first.deduplication_id, "evt-0");
        assert_eq!(first.group_id, "SendGridEvents");
        let body: Value = serde_json::from_str(&first.body).unwrap();
        assert!(body.get("email").is_none());
        assert_eq!(body["sendId"], "send-0");
        assert_eq!(body.as_object().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn rejected_single_batch_counts_one_failure() {
        let sender = RecordingSender {
            fail_all: true,
            ..Default::default()
        };
        let events = (0..3).map(full_event).collect();

        let summary = ingest(&sender, &target(), events).await.unwrap();

        assert_eq!(summary.total_succeeded, 0);
        assert_eq!(summary.total_failed, 1);
        assert_eq!(summary.rejected_batches, 1);
    }

    #[tokio::test]
    async fn missing_event_id_fails_only_that_entry() {
        let sender = RecordingSender::default();
        let events = vec![
            full_event(0),
            json!({ "event": "delivered", "sendId": "send-x" }),
            full_event(2),
        ];

        let summary = ingest(&sender, &target(), events).await.unwrap();

        assert_eq!(summary.total_succeeded, 2);
        assert_eq!(summary.total_failed, 1);
        assert_eq!(summary.rejected_batches, 0);
        assert_eq!(summary.failed_entries.len(), 1);
        assert_eq!(summary.failed_entries[0].id, "");
        assert_eq!(sender.batches.lock().unwrap().len(), 1);
    }

    #[test]
    fn prepared_batches_preserve_event_order() {
        let events: Vec<Value> = (0..23).map(full_event).collect();
        let batches = prepare_batches(events, "g").unwrap();

        let ids: Vec<String> = batches.into_iter().flatten().map(|m| m.id).collect();
        let expected: Vec<String> = (0..23).map(|i| format!("evt-{i}")).collect();
        assert_eq!(ids, expected);
    }
}
