use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{cache_key_prefix, ResultCache};
use crate::detector::detect_new;
use crate::dispatch::{AlertSink, Dispatcher};
use crate::error::SourceError;
use crate::events::{EventBus, MonitorEvent};
use crate::question::Question;
use crate::settings::{MonitorSettings, SharedSettings};
use crate::source::{CachedSource, QuestionSource};
use crate::subscription::{normalize_tag, SubscriptionRegistry, TagSubscription};

/// Outcome of one pass over the active subscriptions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub skipped: usize,
    pub failed: usize,
    pub new_questions: usize,
}

struct RunningLoop {
    generation: u64,
    cancel: CancellationToken,
}

struct MonitorInner {
    registry: SubscriptionRegistry,
    source: Arc<dyn QuestionSource>,
    dispatcher: Dispatcher,
    settings: SharedSettings,
    events: EventBus,
    cache: Option<ResultCache>,
    running: Mutex<Option<RunningLoop>>,
    generation: AtomicU64,
    /// Held for a whole cycle so a stopped loop's last cycle, a new loop
    /// and `check_now` never dispatch from the same snapshot.
    cycle_lock: tokio::sync::Mutex<()>,
}

/// Polls every due subscription on a background task and dispatches
/// notifications for new questions. At most one loop runs at a time.
#[derive(Clone)]
pub struct TagMonitor {
    inner: Arc<MonitorInner>,
}

/// Returned by [`TagMonitor::start`]; stops the loop it was issued for.
#[derive(Clone)]
pub struct MonitorHandle {
    monitor: TagMonitor,
    generation: u64,
    cancel: CancellationToken,
}

impl MonitorHandle {
    pub fn stop(&self) {
        self.monitor.stop_generation(self.generation);
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the loop has been asked to stop.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await
    }
}

impl TagMonitor {
    /// Uses `source` as is; wrap it in a [`CachedSource`] to share a cache.
    pub fn new(
        source: Arc<dyn QuestionSource>,
        sink: Arc<dyn AlertSink>,
        settings: SharedSettings,
    ) -> Self {
        Self::with_events(source, sink, settings, EventBus::new())
    }

    /// Routes every fetch through `cache`.
    pub fn cached<S: QuestionSource + 'static>(
        source: S,
        cache: ResultCache,
        sink: Arc<dyn AlertSink>,
        settings: SharedSettings,
    ) -> Self {
        let events = EventBus::new();
        let cached = CachedSource::new(source, cache.clone(), settings.clone(), events.clone());
        Self::build(Arc::new(cached), Some(cache), sink, settings, events)
    }

    pub fn with_events(
        source: Arc<dyn QuestionSource>,
        sink: Arc<dyn AlertSink>,
        settings: SharedSettings,
        events: EventBus,
    ) -> Self {
        Self::build(source, None, sink, settings, events)
    }

    fn build(
        source: Arc<dyn QuestionSource>,
        cache: Option<ResultCache>,
        sink: Arc<dyn AlertSink>,
        settings: SharedSettings,
        events: EventBus,
    ) -> Self {
        let dispatcher = Dispatcher::new(sink, settings.clone(), events.clone());
        Self {
            inner: Arc::new(MonitorInner {
                registry: SubscriptionRegistry::new(events.clone()),
                source,
                dispatcher,
                settings,
                events,
                cache,
                running: Mutex::new(None),
                generation: AtomicU64::new(0),
                cycle_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<MonitorEvent> {
        self.inner.events.subscribe()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.inner.settings
    }

    /// The cache behind [`TagMonitor::cached`], if any.
    pub fn cache(&self) -> Option<&ResultCache> {
        self.inner.cache.as_ref()
    }

    pub async fn subscribe(&self, tag: &str) -> Option<TagSubscription> {
        let interval = self.inner.settings.read(MonitorSettings::check_interval);
        self.inner.registry.subscribe(tag, interval, Utc::now()).await
    }

    /// Deactivates `tag` and drops its cached pages; monitoring stops once
    /// nothing is left to watch.
    pub async fn unsubscribe(&self, tag: &str) {
        let any_active = self.inner.registry.unsubscribe(tag).await;
        if let (Some(cache), Some(tag)) = (&self.inner.cache, normalize_tag(tag)) {
            let dropped = cache.invalidate_prefix(&cache_key_prefix(&tag));
            debug!(tag = %tag, dropped, "invalidated cached pages");
        }
        if !any_active && self.is_running() {
            info!("no active subscriptions left, stopping monitoring");
            self.stop();
        }
    }

    pub async fn subscriptions(&self) -> Vec<TagSubscription> {
        self.inner.registry.active().await
    }

    pub async fn clear_subscriptions(&self) {
        self.inner.registry.clear().await;
        self.stop();
    }

    /// Clamped to [1, 60]; the running loop uses it from its next sleep on.
    pub fn set_monitoring_interval(&self, minutes: i64) -> u64 {
        self.inner.settings.set_monitoring_interval(minutes)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.lock().is_some()
    }

    /// Spawns the polling loop on the current tokio runtime. A second call
    /// while running returns a handle to the existing loop.
    ///
    /// Outside a runtime nothing is spawned and the returned handle is
    /// already stopped.
    pub fn start(&self) -> MonitorHandle {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime, monitoring not started");
            let cancel = CancellationToken::new();
            cancel.cancel();
            return MonitorHandle {
                monitor: self.clone(),
                generation: 0,
                cancel,
            };
        };
        let mut running = self.inner.running.lock();
        if let Some(current) = running.as_ref() {
            debug!("monitoring already running");
            return MonitorHandle {
                monitor: self.clone(),
                generation: current.generation,
                cancel: current.cancel.clone(),
            };
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        *running = Some(RunningLoop {
            generation,
            cancel: cancel.clone(),
        });
        drop(running);

        self.inner
            .events
            .emit(MonitorEvent::MonitoringStateChanged { running: true });
        let monitor = self.clone();
        let token = cancel.clone();
        runtime.spawn(async move { monitor.run_loop(generation, token).await });

        MonitorHandle {
            monitor: self.clone(),
            generation,
            cancel,
        }
    }

    /// Cancels the running loop. No-op when stopped.
    pub fn stop(&self) {
        let taken = self.inner.running.lock().take();
        self.halt(taken);
    }

    fn stop_generation(&self, generation: u64) {
        let taken = {
            let mut running = self.inner.running.lock();
            match running.as_ref() {
                Some(current) if current.generation == generation => running.take(),
                _ => None,
            }
        };
        self.halt(taken);
    }

    fn halt(&self, taken: Option<RunningLoop>) {
        if let Some(current) = taken {
            current.cancel.cancel();
            info!("stopped tag monitoring");
            self.inner
                .events
                .emit(MonitorEvent::MonitoringStateChanged { running: false });
        }
    }

    async fn run_loop(self, generation: u64, cancel: CancellationToken) {
        info!("tag monitoring started");
        let mut cycle: u64 = 0;
        while !cancel.is_cancelled() {
            cycle += 1;
            debug!(cycle, "poll cycle starting");

            // A panicking cycle must not take the loop down with it.
            let this = self.clone();
            match tokio::spawn(async move { this.run_cycle().await }).await {
                Ok(report) => debug!(
                    cycle,
                    checked = report.checked,
                    skipped = report.skipped,
                    failed = report.failed,
                    new_questions = report.new_questions,
                    "poll cycle complete"
                ),
                Err(err) => warn!(cycle, error = %err, "poll cycle aborted"),
            }

            let interval = self.inner.settings.read(MonitorSettings::monitoring_interval);
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("monitoring shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
        // Loop exits on its own only through cancellation; clear state if still ours.
        self.stop_generation(generation);
    }

    /// Runs one poll cycle inline.
    pub async fn check_now(&self) -> CycleReport {
        self.run_cycle().await
    }

    async fn run_cycle(&self) -> CycleReport {
        let _cycle = self.inner.cycle_lock.lock().await;
        if let Some(cache) = &self.inner.cache {
            let purged = cache.purge_expired();
            if purged > 0 {
                debug!(purged, "purged expired cache entries");
            }
        }
        let settings = self.inner.settings.snapshot();
        let now = Utc::now();
        let mut report = CycleReport::default();

        for sub in self.inner.registry.active().await {
            if !sub.is_due(now) {
                debug!(tag = %sub.tag, "not due yet");
                report.skipped += 1;
                continue;
            }
            match self.check_subscription(&sub, &settings).await {
                Ok(found) => {
                    report.checked += 1;
                    report.new_questions += found;
                }
                Err(err) => {
                    report.failed += 1;
                    if err.is_rate_limited() {
                        warn!(tag = %sub.tag, error = %err, "rate limited, skipping tag this cycle");
                    } else {
                        warn!(tag = %sub.tag, error = %err, "failed to check tag");
                    }
                    self.inner.events.emit(MonitorEvent::CheckFailed {
                        tag: sub.tag.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        report
    }

    async fn check_subscription(
        &self,
        sub: &TagSubscription,
        settings: &MonitorSettings,
    ) -> Result<usize, SourceError> {
        let questions = self
            .inner
            .source
            .fetch_by_tag(&sub.tag, 1, settings.monitor_page_size)
            .await?;
        let fresh = detect_new(&questions, sub, settings.grace_window());

        for question in &fresh {
            self.inner.events.emit(MonitorEvent::NewQuestion {
                tag: sub.tag.clone(),
                question: question.clone(),
            });
            self.inner.dispatcher.dispatch(question, &sub.tag);
        }
        if !fresh.is_empty() {
            info!(tag = %sub.tag, count = fresh.len(), "found new questions");
        }

        let ids: Vec<u64> = fresh.iter().map(|q| q.id).collect();
        self.inner
            .registry
            .record_check(&sub.tag, sub.last_checked, Utc::now(), &ids)
            .await;
        Ok(fresh.len())
    }

    /// User-initiated fetch through the same source and cache as the loop.
    pub async fn search(
        &self,
        tag: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Question>, SourceError> {
        self.inner.source.fetch_by_tag(tag, page, page_size).await
    }
}
