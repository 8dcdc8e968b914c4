use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::AlertError;
use crate::events::{EventBus, MonitorEvent};
use crate::inbox::RecentNotifications;
use crate::question::Question;
use crate::settings::SharedSettings;

/// Pending activations kept before the oldest are dropped.
const MAX_PENDING_HANDLES: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationEvent {
    pub title: String,
    pub message: String,
    pub tag: String,
    pub question_id: u64,
    pub question_url: String,
    pub timestamp: DateTime<Utc>,
    pub is_unread: bool,
}

/// Links a surfaced alert to the url it opens. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DispatchHandle(pub u64);

#[derive(Debug, Clone)]
pub struct Alert {
    pub handle: DispatchHandle,
    pub title: String,
    pub message: String,
    pub url: String,
    pub duration: Duration,
}

/// Presentation surface for alerts. Calls are fire-and-forget.
pub trait AlertSink: Send + Sync {
    fn show_alert(&self, alert: &Alert) -> Result<(), AlertError>;
    fn play_sound(&self) -> Result<(), AlertError>;
}

/// Sink that only logs; used when no presentation layer is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn show_alert(&self, alert: &Alert) -> Result<(), AlertError> {
        info!(handle = alert.handle.0, title = %alert.title, url = %alert.url, "alert");
        Ok(())
    }

    fn play_sound(&self) -> Result<(), AlertError> {
        debug!("alert sound");
        Ok(())
    }
}

/// Turns detected questions into [`NotificationEvent`]s and optional alerts.
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn AlertSink>,
    settings: SharedSettings,
    events: EventBus,
    inbox: RecentNotifications,
    pending: Arc<Mutex<BTreeMap<DispatchHandle, String>>>,
    next_handle: Arc<AtomicU64>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn AlertSink>, settings: SharedSettings, events: EventBus) -> Self {
        let inbox = RecentNotifications::new(settings.clone());
        Self {
            sink,
            settings,
            events,
            inbox,
            pending: Arc::new(Mutex::new(BTreeMap::new())),
            next_handle: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn inbox(&self) -> &RecentNotifications {
        &self.inbox
    }

    pub fn dispatch(&self, question: &Question, tag: &str) -> NotificationEvent {
        let event = NotificationEvent {
            title: format!("New {tag} Question"),
            message: question.title.clone(),
            tag: tag.to_string(),
            question_id: question.id,
            question_url: question.url.clone(),
            timestamp: Utc::now(),
            is_unread: true,
        };

        let (popup, sound, duration) = self
            .settings
            .read(|s| (s.popup_enabled, s.sound_enabled, s.notification_duration()));

        if popup {
            self.surface(&event, duration);
        }
        if sound {
            if let Err(err) = self.sink.play_sound() {
                warn!(error = %err, "failed to play alert sound");
            }
        }

        self.inbox.push(event.clone());
        self.events
            .emit(MonitorEvent::NotificationRaised(event.clone()));
        info!(question_id = question.id, tag = %tag, "notification raised");
        event
    }

    fn surface(&self, event: &NotificationEvent, duration: Duration) {
        let handle = DispatchHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        {
            let mut pending = self.pending.lock();
            pending.insert(handle, event.question_url.clone());
            while pending.len() > MAX_PENDING_HANDLES {
                pending.pop_first();
            }
        }

        let alert = Alert {
            handle,
            title: event.title.clone(),
            message: event.message.clone(),
            url: event.question_url.clone(),
            duration,
        };
        if let Err(err) = self.sink.show_alert(&alert) {
            warn!(error = %err, question_id = event.question_id, "failed to show alert");
            self.pending.lock().remove(&handle);
        }
    }

    /// Resolves an activated alert to its url, once. Unknown or already
    /// resolved handles yield `None`.
    pub fn activate(&self, handle: DispatchHandle) -> Option<String> {
        let url = self.pending.lock().remove(&handle);
        if url.is_none() {
            debug!(handle = handle.0, "ignoring stale alert activation");
        }
        url
    }

    /// Forgets an alert that expired without activation.
    pub fn dismiss(&self, handle: DispatchHandle) {
        self.pending.lock().remove(&handle);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Raises a synthetic notification and plays the sound.
    pub fn send_test(&self) -> NotificationEvent {
        let now = Utc::now();
        let question = Question {
            id: 999,
            title: "Test Notification - Is this working?".to_string(),
            url: "https://stackoverflow.com/questions/12345678".to_string(),
            is_answered: true,
            score: 5,
            view_count: 100,
            answer_count: 2,
            created_at: now,
            tags: vec!["test".to_string()],
            author_name: "Unknown".to_string(),
        };
        let event = self.dispatch(&question, "test");
        if !self.settings.read(|s| s.sound_enabled) {
            if let Err(err) = self.sink.play_sound() {
                warn!(error = %err, "failed to play alert sound");
            }
        }
        event
    }
}
