//! SQS transport.
//!
//! [`QueueSender`] is the seam the dispatcher talks to, so the pipeline can be exercised without
//! AWS. [`LazyQueue`] holds the process-wide sender and builds it on first use.

use std::{future::Future, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_sqs::{error::DisplayErrorContext, types::SendMessageBatchRequestEntry};
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::OnceCell;

use crate::batching::OutboundMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A batch entry the queue refused.
pub struct FailedEntry {
    pub id: String,
    pub code: String,
    pub message: Option<String>,
    /// `true` when the queue blames the request rather than itself.
    pub sender_fault: bool,
}

impl FailedEntry {
    pub fn reason(&self) -> String {
        match &self.message {
            Some(message) => format!("{}: {message}", self.code),
            None => self.code.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Per-entry result of a `SendMessageBatch` call that reached the queue.
pub struct BatchSendOutput {
    pub successful: Vec<String>,
    pub failed: Vec<FailedEntry>,
}

#[async_trait]
/// Sends one batch of messages to a queue.
///
/// An `Err` means the batch as a whole never got an answer (network, auth, throttling). Entries
/// refused individually come back in [`BatchSendOutput::failed`].
pub trait QueueSender: Send + Sync {
    async fn send_batch(
        &self,
        queue_url: &str,
        messages: &[OutboundMessage],
    ) -> anyhow::Result<BatchSendOutput>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Client settings for [`SqsQueueSender`].
pub struct QueueSettings {
    pub region: String,
    /// Endpoint override, e.g. a local ElasticMQ.
    pub endpoint_url: Option<String>,
    /// Reported in the SDK user agent.
    pub app_name: String,
}

/// AWS SDK implementation of [`QueueSender`].
pub struct SqsQueueSender {
    client: aws_sdk_sqs::Client,
}

impl SqsQueueSender {
    /// Build a client using standard AWS credential resolution.
    pub async fn connect(settings: &QueueSettings) -> anyhow::Result<Self> {
        let mut loader =
            aws_config::from_env().region(aws_config::Region::new(settings.region.clone()));

        if let Some(endpoint) = &settings.endpoint_url {
            url::Url::parse(endpoint)
                .with_context(|| format!("invalid queue endpoint override: {endpoint}"))?;
            loader = loader.endpoint_url(endpoint.as_str());
        }

        let app_name = aws_config::AppName::new(settings.app_name.clone())
            .with_context(|| format!("invalid app name: {}", settings.app_name))?;
        let cfg = loader.app_name(app_name).load().await;

        Ok(Self {
            client: aws_sdk_sqs::Client::new(&cfg),
        })
    }
}

#[async_trait]
impl QueueSender for SqsQueueSender {
    async fn send_batch(
        &self,
        queue_url: &str,
        messages: &[OutboundMessage],
    ) -> anyhow::Result<BatchSendOutput> {
        let entries = messages
            .iter()
            .map(|m| {
                SendMessageBatchRequestEntry::builder()
                    .id(&m.id)
                    .message_body(&m.body)
                    .message_deduplication_id(&m.deduplication_id)
                    .message_group_id(&m.group_id)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .context("build batch entries")?;

        let out = self
            .client
            .send_message_batch()
            .queue_url(queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|err| anyhow::anyhow!("send_message_batch: {}", DisplayErrorContext(&err)))?;

        Ok(BatchSendOutput {
            successful: out.successful().iter().map(|e| e.id().to_string()).collect(),
            failed: out
                .failed()
                .iter()
                .map(|e| FailedEntry {
                    id: e.id().to_string(),
                    code: e.code().to_string(),
                    message: e.message().map(str::to_string),
                    sender_fault: e.sender_fault(),
                })
                .collect(),
        })
    }
}

type Connect =
    Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<Arc<dyn QueueSender>>> + Send + Sync>;

/// Process-wide queue sender, built on first use.
///
/// Concurrent first callers wait on a single connect attempt. A failed attempt leaves the handle
/// empty so the next caller tries again.
pub struct LazyQueue {
    cell: OnceCell<Arc<dyn QueueSender>>,
    connect: Connect,
}

impl LazyQueue {
    pub fn new<F, Fut>(connect: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Arc<dyn QueueSender>>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            connect: Box::new(move || connect().boxed()),
        }
    }

    /// Lazily connect an [`SqsQueueSender`].
    pub fn sqs(settings: QueueSettings) -> Self {
        Self::new(move || {
            let settings = settings.clone();
            async move {
                let sender = SqsQueueSender::connect(&settings).await?;
                Ok(Arc::new(sender) as Arc<dyn QueueSender>)
            }
        })
    }

    /// Wrap an already-built sender.
    pub fn with_sender(sender: Arc<dyn QueueSender>) -> Self {
        Self::new(move || {
            let sender = Arc::clone(&sender);
            async move { Ok(sender) }
        })
    }

    pub async fn get(&self) -> anyhow::Result<Arc<dyn QueueSender>> {
        self.cell
            .get_or_try_init(|| (self.connect)())
            .await
            .map(Arc::clone)
    }

    #[cfg(test)]
    fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}
