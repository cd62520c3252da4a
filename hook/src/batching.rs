//! Outbound queue messages and fixed-size batching.
//!
//! SQS accepts at most [`MAX_BATCH_SIZE`] entries per `SendMessageBatch` call, so the flat list of
//! messages built from one webhook delivery is cut into contiguous groups before dispatch.

use thiserror::Error;

use crate::event::{normalize, InboundEvent};

/// Hard ceiling on entries per `SendMessageBatch` request.
pub const MAX_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
/// One queue entry derived from a single inbound event.
pub struct OutboundMessage {
    /// Batch entry id. Equal to the event's `sg_event_id`, possibly empty.
    pub id: String,
    /// JSON-encoded normalized record.
    pub body: String,
    pub deduplication_id: String,
    pub group_id: String,
}

impl OutboundMessage {
    /// Normalize `event` and wrap it for the queue under `group_id`.
    pub fn from_event(event: &InboundEvent, group_id: &str) -> serde_json::Result<Self> {
        let record = normalize(event);
        let id = event.event_id().to_string();
        Ok(Self {
            body: record.to_json()?,
            deduplication_id: id.clone(),
            id,
            group_id: group_id.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BatchSizeError {
    #[error("batch size must be at least 1")]
    Zero,
    #[error("batch size {0} exceeds the transport limit of 10")]
    TooLarge(usize),
}

/// Split `items` into contiguous groups of at most `size`, preserving order.
///
/// Returns `ceil(len / size)` groups; only the last may be short. An empty input yields no
/// groups. `size` must be within `1..=MAX_BATCH_SIZE`.
pub fn chunk<T>(items: Vec<T>, size: usize) -> Result<Vec<Vec<T>>, BatchSizeError> {
    if size == 0 {
        return Err(BatchSizeError::Zero);
    }
    if size > MAX_BATCH_SIZE {
        return Err(BatchSizeError::TooLarge(size));
    }

    let mut groups = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        groups.push(iter.by_ref().take(size).collect());
    }
    Ok(groups)
}
