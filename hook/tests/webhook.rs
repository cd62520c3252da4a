use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use sendgrid_hook::{
    batching::OutboundMessage,
    config::HookConfig,
    queue::{BatchSendOutput, FailedEntry, LazyQueue, QueueSender},
    server::{build_app, AppState, WEBHOOK_PATH},
};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Stands in for SQS: remembers every message and refuses entries without an id.
#[derive(Default)]
struct MemoryQueue {
    sent: Mutex<Vec<(String, OutboundMessage)>>,
}

#[async_trait]
impl QueueSender for MemoryQueue {
    async fn send_batch(
        &self,
        queue_url: &str,
        messages: &[OutboundMessage],
    ) -> anyhow::Result<BatchSendOutput> {
        let mut out = BatchSendOutput::default();
        let mut sent = self.sent.lock().unwrap();
        for m in messages {
            if m.id.is_empty() {
                out.failed.push(FailedEntry {
                    id: m.id.clone(),
                    code: "MissingParameter".to_string(),
                    message: Some("Id is required".to_string()),
                    sender_fault: true,
                });
                continue;
            }
            sent.push((queue_url.to_string(), m.clone()));
            out.successful.push(m.id.clone());
        }
        Ok(out)
    }
}

fn app(queue: Arc<MemoryQueue>) -> axum::Router {
    let cfg = HookConfig::from_yaml_bytes(
        br#"
queue_url: "https://sqs.us-east-1.amazonaws.com/123456789012/sendgrid-events.fifo"
message_group_id: SendGridEvents
max_body_bytes: 65536
"#,
    )
    .unwrap();
    cfg.validate().unwrap();

    build_app(AppState::new(
        Arc::new(LazyQueue::with_sender(queue)),
        cfg.queue_target().unwrap(),
        cfg.max_body_bytes,
    ))
}

#[tokio::test]
async fn delivery_is_normalized_and_queued() {
    let queue = Arc::new(MemoryQueue::default());
    let payload = json!([
        {
            "event": "open",
            "sg_event_id": "sg-1",
            "sendId": "send-1",
            "timestamp": 1_700_000_001,
            "ip": "198.51.100.7",
            "email": "reader@example.com",
            "useragent": "Mozilla/5.0",
            "attempt": 0
        },
        {
            "event": "click",
            "sg_event_id": "sg-2",
            "sendId": "send-1",
            "url": "https://example.com/landing",
            "reason": ""
        },
        { "event": "processed", "sendId": "send-2" }
    ]);

    let res = app(Arc::clone(&queue))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(WEBHOOK_PATH)
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = to_bytes(res.into_body(), 1024).await.unwrap();
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!("success"));

    let sent = queue.sent.lock().unwrap();
    assert_eq!(sent.len(), 2);

    let (url, open) = &sent[0];
    assert!(url.ends_with("sendgrid-events.fifo"));
    assert_eq!(open.id, "sg-1");
    assert_eq!(open.deduplication_id, "sg-1");
    assert_eq!(open.group_id, "SendGridEvents");
    assert_eq!(
        serde_json::from_str::<Value>(&open.body).unwrap(),
        json!({
            "event": "open",
            "sg_event_id": "sg-1",
            "sendId": "send-1",
            "timestamp": 1_700_000_001,
            "ip": "198.51.100.7"
        })
    );

    let (_, click) = &sent[1];
    assert_eq!(
        serde_json::from_str::<Value>(&click.body).unwrap(),
        json!({
            "event": "click",
            "sg_event_id": "sg-2",
            "sendId": "send-1",
            "url": "https://example.com/landing"
        })
    );
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let res = app(Arc::new(MemoryQueue::default()))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/mailgun")
                .body(Body::from("[]"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
