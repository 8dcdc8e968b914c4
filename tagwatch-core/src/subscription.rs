use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::events::{EventBus, MonitorEvent};

/// How many recently notified ids a subscription remembers.
const RECENT_IDS_CAPACITY: usize = 64;

/// Multiplier applied to the check interval when (re)subscribing, so the tag
/// is due on the very next cycle.
const IMMEDIATE_CHECK_FACTOR: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagSubscription {
    pub tag: String,
    pub last_checked: DateTime<Utc>,
    pub check_interval: Duration,
    pub is_active: bool,
    pub last_question_id: u64,
    /// Ids already notified, so grace-window matches never fire twice.
    #[serde(default)]
    pub recent_ids: VecDeque<u64>,
}

pub(crate) fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// Trims and lowercases a tag. Returns `None` when nothing is left.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

impl TagSubscription {
    pub fn new(tag: String, check_interval: Duration, now: DateTime<Utc>) -> Self {
        Self {
            tag,
            last_checked: immediate_check_time(check_interval, now),
            check_interval,
            is_active: true,
            last_question_id: 0,
            recent_ids: VecDeque::new(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now - self.last_checked >= to_delta(self.check_interval)
    }

    pub fn was_notified(&self, id: u64) -> bool {
        self.recent_ids.contains(&id)
    }

    fn remember(&mut self, id: u64) {
        if self.recent_ids.contains(&id) {
            return;
        }
        if self.recent_ids.len() == RECENT_IDS_CAPACITY {
            self.recent_ids.pop_front();
        }
        self.recent_ids.push_back(id);
    }
}

fn immediate_check_time(check_interval: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
    let back = to_delta(check_interval.saturating_mul(IMMEDIATE_CHECK_FACTOR));
    now.checked_sub_signed(back).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Tag subscriptions, soft-deactivated on unsubscribe so their watermark survives.
#[derive(Debug, Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<RwLock<Vec<TagSubscription>>>,
    events: EventBus,
}

impl SubscriptionRegistry {
    pub fn new(events: EventBus) -> Self {
        Self::with_subscriptions(Vec::new(), events)
    }

    pub fn with_subscriptions(initial: Vec<TagSubscription>, events: EventBus) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
            events,
        }
    }

    /// Subscribes to `tag`, or reactivates it. Either way the tag becomes due
    /// immediately. Returns `None` for a blank tag.
    pub async fn subscribe(
        &self,
        tag: &str,
        check_interval: Duration,
        now: DateTime<Utc>,
    ) -> Option<TagSubscription> {
        let tag = normalize_tag(tag)?;
        let mut subs = self.inner.write().await;
        let (snapshot, changed) = match subs.iter_mut().find(|s| s.tag == tag) {
            Some(existing) => {
                let changed = !existing.is_active;
                existing.is_active = true;
                existing.check_interval = check_interval;
                existing.last_checked = immediate_check_time(check_interval, now);
                if changed {
                    info!(tag = %tag, "reactivated subscription");
                } else {
                    debug!(tag = %tag, "subscription already active");
                }
                (existing.clone(), changed)
            }
            None => {
                let sub = TagSubscription::new(tag.clone(), check_interval, now);
                subs.push(sub.clone());
                info!(tag = %tag, "subscribed to tag");
                (sub, true)
            }
        };
        let active = active_of(&subs);
        drop(subs);

        if changed {
            self.events.emit(MonitorEvent::SubscriptionsChanged(active));
        }
        Some(snapshot)
    }

    /// Deactivates `tag` if present. Returns whether any active subscription remains.
    pub async fn unsubscribe(&self, tag: &str) -> bool {
        let Some(tag) = normalize_tag(tag) else {
            return self.has_active().await;
        };
        let mut subs = self.inner.write().await;
        let mut changed = false;
        if let Some(existing) = subs.iter_mut().find(|s| s.tag == tag && s.is_active) {
            existing.is_active = false;
            changed = true;
            info!(tag = %tag, "unsubscribed from tag");
        }
        let active = active_of(&subs);
        drop(subs);

        let any_active = !active.is_empty();
        if changed {
            self.events.emit(MonitorEvent::SubscriptionsChanged(active));
        }
        any_active
    }

    pub async fn active(&self) -> Vec<TagSubscription> {
        active_of(&*self.inner.read().await)
    }

    pub async fn all(&self) -> Vec<TagSubscription> {
        self.inner.read().await.clone()
    }

    pub async fn get(&self, tag: &str) -> Option<TagSubscription> {
        let tag = normalize_tag(tag)?;
        self.inner
            .read()
            .await
            .iter()
            .find(|s| s.tag == tag)
            .cloned()
    }

    pub async fn has_active(&self) -> bool {
        self.inner.read().await.iter().any(|s| s.is_active)
    }

    /// Active subscriptions whose check interval has elapsed.
    pub async fn due(&self, now: DateTime<Utc>) -> Vec<TagSubscription> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|s| s.is_active && s.is_due(now))
            .cloned()
            .collect()
    }

    /// Stores the outcome of a check started when the subscription's
    /// `last_checked` was `checked_from`. The watermark only advances when
    /// something new was notified. `last_checked` moves to `now` unless a
    /// re-subscribe rewound it meanwhile, so the requested re-check survives.
    pub async fn record_check(
        &self,
        tag: &str,
        checked_from: DateTime<Utc>,
        now: DateTime<Utc>,
        notified_ids: &[u64],
    ) {
        let mut subs = self.inner.write().await;
        let Some(sub) = subs.iter_mut().find(|s| s.tag == tag) else {
            return;
        };
        if let Some(max_id) = notified_ids.iter().copied().max() {
            sub.last_question_id = sub.last_question_id.max(max_id);
        }
        for id in notified_ids {
            sub.remember(*id);
        }
        if sub.last_checked == checked_from {
            sub.last_checked = now;
        } else {
            debug!(tag = %tag, "subscription re-armed during check, keeping its schedule");
        }
    }

    /// Destroys every subscription, active or not.
    pub async fn clear(&self) {
        let mut subs = self.inner.write().await;
        let had_active = subs.iter().any(|s| s.is_active);
        subs.clear();
        drop(subs);
        info!("cleared all subscriptions");
        if had_active {
            self.events.emit(MonitorEvent::SubscriptionsChanged(Vec::new()));
        }
    }
}

fn active_of(subs: &[TagSubscription]) -> Vec<TagSubscription> {
    subs.iter().filter(|s| s.is_active).cloned().collect()
}
