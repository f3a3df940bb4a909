use async_trait::async_trait;
use n9e_common::time::Clock;
use n9e_common::types::{AlertEvent, NotificationRecord, NotifyStatus};
use n9e_storage::Store;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::contacts::ContactResolver;
use crate::error::Result;
use crate::transport::NotificationTransport;
use crate::utils::truncate_details;

/// Channel name of intents produced from rule callbacks.
pub const CALLBACK_CHANNEL: &str = "callback";

/// Details of the failure record written for an intent dropped on overflow.
pub const OVERFLOW_DETAILS: &str = "queue overflow: dropped";

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// One delivery of one event on one channel to one recipient.
#[derive(Debug, Clone)]
pub struct NotificationIntent {
    /// The event as rewritten by the subscription, if any.
    pub event: Arc<AlertEvent>,
    /// 0 when the intent comes from the rule itself.
    pub sub_rule_id: i64,
    pub channel: String,
    /// Phone, email, webhook URL...
    pub target: String,
}

impl NotificationIntent {
    pub fn event_id(&self) -> i64 {
        self.event.id
    }
}

/// Destination of notification records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Appends a record and returns its id.
    async fn append(&self, record: &NotificationRecord) -> Result<i64>;
}

#[async_trait]
impl RecordSink for Store {
    async fn append(&self, record: &NotificationRecord) -> Result<i64> {
        Ok(self.insert_notification_record(record).await?)
    }
}

/// Counters for one [`Emitter::dispatch_pending`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub sent: usize,
    pub failed: usize,
}

/// Expands events into intents and drains them through a transport.
///
/// Each channel owns a bounded FIFO. Once a queue is full the oldest queued
/// intent is dropped in favour of the new one and a failure record is
/// written for it.
pub struct Emitter {
    transport: Arc<dyn NotificationTransport>,
    contacts: Arc<dyn ContactResolver>,
    sink: Arc<dyn RecordSink>,
    clock: Arc<dyn Clock>,
    capacity: usize,
    queues: Mutex<BTreeMap<String, VecDeque<NotificationIntent>>>,
    dropped: AtomicU64,
}

impl Emitter {
    pub fn new(
        transport: Arc<dyn NotificationTransport>,
        contacts: Arc<dyn ContactResolver>,
        sink: Arc<dyn RecordSink>,
        clock: Arc<dyn Clock>,
        capacity: usize,
    ) -> Self {
        Self {
            transport,
            contacts,
            sink,
            clock,
            capacity: capacity.max(1),
            queues: Mutex::new(BTreeMap::new()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Channels × recipients, then one `callback` intent per distinct
    /// callback URL.
    pub fn expand(&self, event: &AlertEvent, sub_rule_id: i64) -> Vec<NotificationIntent> {
        let shared = Arc::new(event.clone());
        let mut intents = Vec::new();

        for channel in &event.notify_channels {
            let targets = self.contacts.resolve(channel, &event.notify_groups);
            if targets.is_empty() {
                tracing::debug!(
                    hash = %event.hash,
                    channel = %channel,
                    "No recipients resolved for channel"
                );
            }
            intents.extend(targets.into_iter().map(|target| NotificationIntent {
                event: Arc::clone(&shared),
                sub_rule_id,
                channel: channel.clone(),
                target,
            }));
        }

        let mut seen = HashSet::new();
        for url in &event.callbacks {
            if url.is_empty() || !seen.insert(url.as_str()) {
                continue;
            }
            intents.push(NotificationIntent {
                event: Arc::clone(&shared),
                sub_rule_id,
                channel: CALLBACK_CHANNEL.to_string(),
                target: url.clone(),
            });
        }

        intents
    }

    /// Expands and enqueues the event. Returns the number of intents queued.
    pub async fn emit(&self, event: &AlertEvent, sub_rule_id: i64) -> usize {
        let intents = self.expand(event, sub_rule_id);
        let queued = intents.len();

        let mut overflowed = Vec::new();
        {
            let mut queues = self.queues.lock().await;
            for intent in intents {
                let queue = queues.entry(intent.channel.clone()).or_default();
                if queue.len() >= self.capacity {
                    if let Some(oldest) = queue.pop_front() {
                        overflowed.push(oldest);
                    }
                }
                queue.push_back(intent);
            }
        }

        for intent in overflowed {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                event_id = intent.event_id(),
                channel = %intent.channel,
                target = %intent.target,
                "Notification queue full, dropping oldest intent"
            );
            self.record(&intent, NotifyStatus::Failure, OVERFLOW_DETAILS).await;
        }

        queued
    }

    /// Sends everything queued right now, one intent per channel per round.
    pub async fn dispatch_pending(&self) -> DispatchStats {
        let mut stats = DispatchStats::default();
        loop {
            let batch: Vec<NotificationIntent> = {
                let mut queues = self.queues.lock().await;
                queues.values_mut().filter_map(VecDeque::pop_front).collect()
            };
            if batch.is_empty() {
                break;
            }
            for intent in batch {
                match self.transport.send(&intent).await {
                    Ok(details) => {
                        stats.sent += 1;
                        self.record(&intent, NotifyStatus::Success, &details).await;
                    }
                    Err(e) => {
                        stats.failed += 1;
                        tracing::warn!(
                            event_id = intent.event_id(),
                            channel = %intent.channel,
                            target = %intent.target,
                            error = %e,
                            "Notification delivery failed"
                        );
                        self.record(&intent, NotifyStatus::Failure, &e.to_string()).await;
                    }
                }
            }
        }
        stats
    }

    /// Intents queued and not yet started.
    pub async fn pending(&self) -> usize {
        self.queues.lock().await.values().map(VecDeque::len).sum()
    }

    /// Intents dropped on overflow since start.
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Dispatch loop; runs until the task is aborted.
    pub async fn run(self: Arc<Self>, every: Duration) {
        let mut tick = tokio::time::interval(every);
        loop {
            tick.tick().await;
            let stats = self.dispatch_pending().await;
            if stats.sent + stats.failed > 0 {
                tracing::debug!(sent = stats.sent, failed = stats.failed, "Dispatched notifications");
            }
        }
    }

    async fn record(&self, intent: &NotificationIntent, status: NotifyStatus, details: &str) {
        let record = NotificationRecord {
            id: 0,
            event_id: intent.event_id(),
            sub_rule_id: intent.sub_rule_id,
            channel: intent.channel.clone(),
            target: intent.target.clone(),
            status,
            details: truncate_details(details),
            created_at: self.clock.unix(),
        };
        if let Err(e) = self.sink.append(&record).await {
            tracing::error!(
                event_id = record.event_id,
                channel = %record.channel,
                error = %e,
                "Failed to append notification record"
            );
        }
    }
}
