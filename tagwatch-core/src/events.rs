use tokio::sync::broadcast;
use tracing::trace;

use crate::dispatch::NotificationEvent;
use crate::question::Question;
use crate::subscription::TagSubscription;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum MonitorEvent {
    NewQuestion { tag: String, question: Question },
    NotificationRaised(NotificationEvent),
    /// Active subscriptions after the change.
    SubscriptionsChanged(Vec<TagSubscription>),
    CacheLookup { key: String, hit: bool },
    MonitoringStateChanged { running: bool },
    CheckFailed { tag: String, error: String },
}

/// Fan-out of [`MonitorEvent`]s to any number of listeners.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MonitorEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: MonitorEvent) {
        // No listeners is fine.
        if self.tx.send(event).is_err() {
            trace!("event dropped, no listeners");
        }
    }
}
