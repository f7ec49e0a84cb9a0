use async_trait::async_trait;
use metrics::counter;
use tracing::{debug, error, info};

use line_relay_core::{TextMessageEvent, WebhookEvent};

use crate::reply::{ReplyError, ReplyOrchestrator};

/// Handlers for the event variants the relay acts on.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Returns whether a reply was sent.
    async fn on_text_message(&self, event: &TextMessageEvent) -> Result<bool, ReplyError>;
}

#[async_trait]
impl EventHandler for ReplyOrchestrator {
    async fn on_text_message(&self, event: &TextMessageEvent) -> Result<bool, ReplyError> {
        self.respond(&event.reply_token, &event.text).await
    }
}

/// Outcome counts for one webhook delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub replied: usize,
    pub unanswered: usize,
    pub failed: usize,
    pub ignored: usize,
}

/// Hands each event to its handler, one at a time and in array order.
///
/// Events are awaited sequentially so replies leave in the order the
/// platform delivered the events. A failing handler is logged and does not
/// stop the rest of the batch.
pub async fn dispatch<H>(events: &[WebhookEvent], handler: &H) -> DispatchSummary
where
    H: EventHandler + ?Sized,
{
    let mut summary = DispatchSummary::default();

    for (position, event) in events.iter().enumerate() {
        counter!("webhook_events_total", "kind" => metric_kind(event)).increment(1);
        let meta = event.meta();

        match event {
            WebhookEvent::TextMessage(text) => match handler.on_text_message(text).await {
                Ok(true) => summary.replied += 1,
                Ok(false) => summary.unanswered += 1,
                Err(err) => {
                    summary.failed += 1;
                    error!(
                        stage = "dispatch",
                        position,
                        message_id = %text.message_id,
                        webhook_event_id = meta.webhook_event_id.as_deref().unwrap_or("-"),
                        redelivery = meta.is_redelivery,
                        error = %err,
                        "failed to handle text message"
                    );
                }
            },
            WebhookEvent::Message { .. }
            | WebhookEvent::Follow { .. }
            | WebhookEvent::Unfollow { .. }
            | WebhookEvent::Join { .. }
            | WebhookEvent::Leave { .. }
            | WebhookEvent::Postback { .. }
            | WebhookEvent::Other { .. } => {
                summary.ignored += 1;
                debug!(
                    stage = "dispatch",
                    position,
                    kind = event.kind(),
                    source = meta.source.as_ref().map(|s| s.kind()).unwrap_or("-"),
                    "no handler for event; ignored"
                );
            }
        }
    }

    info!(
        stage = "dispatch",
        replied = summary.replied,
        unanswered = summary.unanswered,
        failed = summary.failed,
        ignored = summary.ignored,
        "dispatch completed"
    );
    summary
}

fn metric_kind(event: &WebhookEvent) -> &'static str {
    match event {
        WebhookEvent::TextMessage(_) => "text",
        WebhookEvent::Message { .. } => "message",
        WebhookEvent::Follow { .. } => "follow",
        WebhookEvent::Unfollow { .. } => "unfollow",
        WebhookEvent::Join { .. } => "join",
        WebhookEvent::Leave { .. } => "leave",
        WebhookEvent::Postback { .. } => "postback",
        WebhookEvent::Other { .. } => "other",
    }
}
