use async_trait::async_trait;

use crate::emitter::NotificationIntent;
use crate::error::Result;

/// Delivers one intent to one recipient (SMTP, IM webhook, SMS gateway...).
///
/// `Ok(details)` is recorded as a success, `Err` as a failure whose message
/// becomes the record details.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, intent: &NotificationIntent) -> Result<String>;
}

/// Transport that only logs intents. Used by the daemon when no real
/// delivery backend is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send(&self, intent: &NotificationIntent) -> Result<String> {
        let event = &intent.event;
        tracing::info!(
            event_id = event.id,
            hash = %event.hash,
            rule_id = event.rule_id,
            severity = event.severity,
            recovered = event.is_recovered,
            sub_rule_id = intent.sub_rule_id,
            channel = %intent.channel,
            target = %intent.target,
            "Notification intent"
        );
        Ok("logged".to_string())
    }
}
