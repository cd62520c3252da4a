//! `sendgrid-hook` receives SendGrid event webhooks and forwards them to a FIFO SQS queue.
//!
//! Each delivery is a JSON array of events. Events are reduced to an allow-listed record, grouped
//! into batches of at most ten, and every batch is sent concurrently. Per-batch and per-entry
//! failures are logged and counted, never surfaced to SendGrid.
//!
//! Core modules:
//! - [`event`]: inbound events and record normalization
//! - [`batching`]: outbound messages + fixed-size chunking
//! - [`queue`]: queue transport seam, SQS client, lazily shared handle
//! - [`dispatch`]: concurrent batch sends
//! - [`aggregate`]: outcome totals
//! - [`pipeline`]: end-to-end ingestion of one delivery
//! - [`config`]: service config (YAML + environment)
//! - [`server`]: axum server wiring

pub mod aggregate;
pub mod batching;
pub mod config;
pub mod dispatch;
pub mod event;
pub mod pipeline;
pub mod queue;
pub mod server;
