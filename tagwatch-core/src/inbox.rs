use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::dispatch::NotificationEvent;
use crate::settings::SharedSettings;

/// Newest-first list of raised notifications, bounded by `max_recent_questions`.
#[derive(Debug, Clone)]
pub struct RecentNotifications {
    inner: Arc<Mutex<VecDeque<NotificationEvent>>>,
    settings: SharedSettings,
}

impl RecentNotifications {
    pub fn new(settings: SharedSettings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            settings,
        }
    }

    pub fn push(&self, event: NotificationEvent) {
        let max = self.settings.read(|s| s.max_recent_questions);
        let mut inner = self.inner.lock();
        inner.retain(|e| !(e.question_id == event.question_id && e.tag == event.tag));
        inner.push_front(event);
        inner.truncate(max);
    }

    pub fn list(&self) -> Vec<NotificationEvent> {
        self.inner.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.lock().iter().filter(|e| e.is_unread).count()
    }

    /// Marks every entry for `question_id` as read. Returns whether one was unread.
    pub fn mark_read(&self, question_id: u64) -> bool {
        let mut changed = false;
        for event in self.inner.lock().iter_mut() {
            if event.question_id == question_id && event.is_unread {
                event.is_unread = false;
                changed = true;
            }
        }
        if !changed {
            debug!(question_id, "notification already read or unknown");
        }
        changed
    }

    pub fn mark_all_read(&self) {
        for event in self.inner.lock().iter_mut() {
            event.is_unread = false;
        }
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
