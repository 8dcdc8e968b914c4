#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tagwatch_core::{
    Alert, AlertError, AlertSink, MonitorEvent, MonitorSettings, Question, QuestionSource,
    SharedSettings, SourceError,
};
use tokio::sync::{broadcast, Semaphore};

pub fn long_ago() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
}

pub fn question(id: u64) -> Question {
    question_at(id, long_ago())
}

pub fn question_at(id: u64, created_at: DateTime<Utc>) -> Question {
    Question {
        id,
        title: format!("Question {id}"),
        url: format!("https://stackoverflow.com/questions/{id}"),
        is_answered: false,
        score: 0,
        view_count: 0,
        answer_count: 0,
        created_at,
        tags: vec!["rust".into()],
        author_name: "someone".into(),
    }
}

/// Settings where every subscription is due on every cycle.
pub fn eager_settings() -> SharedSettings {
    SharedSettings::new(MonitorSettings {
        check_interval_secs: 0,
        ..MonitorSettings::default()
    })
}

#[derive(Default)]
pub struct ScriptedSource {
    responses: Mutex<HashMap<String, Result<Vec<Question>, SourceError>>>,
    calls: AtomicUsize,
    panic_next: AtomicBool,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, tag: &str, result: Result<Vec<Question>, SourceError>) {
        self.responses.lock().insert(tag.to_string(), result);
    }

    pub fn respond_ids(&self, tag: &str, ids: &[u64]) {
        self.respond(tag, Ok(ids.iter().copied().map(question).collect()));
    }

    pub fn panic_once(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionSource for ScriptedSource {
    async fn fetch_by_tag(
        &self,
        tag: &str,
        _page: u32,
        _page_size: u32,
    ) -> Result<Vec<Question>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("scripted panic");
        }
        self.responses
            .lock()
            .get(tag)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Source whose fetches block until [`GatedSource::open`]; always returns
/// a freshly created question 101.
pub struct GatedSource {
    gate: Semaphore,
    calls: AtomicUsize,
}

impl GatedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionSource for GatedSource {
    async fn fetch_by_tag(
        &self,
        _tag: &str,
        _page: u32,
        _page_size: u32,
    ) -> Result<Vec<Question>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        Ok(vec![question_at(101, Utc::now())])
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub alerts: Mutex<Vec<Alert>>,
    pub sounds: AtomicUsize,
    pub fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }

    pub fn sounds(&self) -> usize {
        self.sounds.load(Ordering::SeqCst)
    }
}

impl AlertSink for RecordingSink {
    fn show_alert(&self, alert: &Alert) -> Result<(), AlertError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AlertError::Unavailable("no display".into()));
        }
        self.alerts.lock().push(alert.clone());
        Ok(())
    }

    fn play_sound(&self) -> Result<(), AlertError> {
        self.sounds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Everything currently buffered on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

pub fn notified_ids(events: &[MonitorEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            MonitorEvent::NotificationRaised(n) => Some(n.question_id),
            _ => None,
        })
        .collect()
}
