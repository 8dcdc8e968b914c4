use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::{cache_key, ResultCache};
use crate::error::SourceError;
use crate::events::{EventBus, MonitorEvent};
use crate::question::Question;
use crate::settings::SharedSettings;
use crate::subscription::normalize_tag;

pub const MAX_PAGE_SIZE: u32 = 100;

/// Boundary to the external question API.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Newest-first questions for `tag`.
    async fn fetch_by_tag(&self, tag: &str, page: u32, page_size: u32)
        -> Result<Vec<Question>, SourceError>;
}

#[async_trait]
impl<S: QuestionSource + ?Sized> QuestionSource for Arc<S> {
    async fn fetch_by_tag(
        &self,
        tag: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Question>, SourceError> {
        (**self).fetch_by_tag(tag, page, page_size).await
    }
}

/// Checks the arguments every source accepts; returns the normalized tag.
pub fn validate_request(tag: &str, page: u32, page_size: u32) -> Result<String, SourceError> {
    let tag = normalize_tag(tag)
        .ok_or_else(|| SourceError::InvalidArgument("tag cannot be empty".into()))?;
    if page == 0 {
        return Err(SourceError::InvalidArgument("page starts at 1".into()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(SourceError::InvalidArgument(format!(
            "page size must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
        )));
    }
    Ok(tag)
}

/// Memoizes another source in a [`ResultCache`]. Empty results are not cached.
pub struct CachedSource<S> {
    inner: S,
    cache: ResultCache,
    settings: SharedSettings,
    events: EventBus,
}

impl<S: QuestionSource> CachedSource<S> {
    pub fn new(inner: S, cache: ResultCache, settings: SharedSettings, events: EventBus) -> Self {
        Self {
            inner,
            cache,
            settings,
            events,
        }
    }
}

#[async_trait]
impl<S: QuestionSource> QuestionSource for CachedSource<S> {
    async fn fetch_by_tag(
        &self,
        tag: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Question>, SourceError> {
        let tag = validate_request(tag, page, page_size)?;
        let (bucket, ttl) = self
            .settings
            .read(|s| (std::time::Duration::from_secs(s.cache_bucket_secs), s.cache_ttl()));
        let key = cache_key(&tag, page, page_size, Utc::now(), bucket);

        if let Some(questions) = self.cache.get(&key) {
            info!(tag = %tag, page, "cache hit");
            self.events.emit(MonitorEvent::CacheLookup { key, hit: true });
            return Ok(questions);
        }
        info!(tag = %tag, page, "cache miss, fetching from source");
        self.events.emit(MonitorEvent::CacheLookup {
            key: key.clone(),
            hit: false,
        });

        let questions = self.inner.fetch_by_tag(&tag, page, page_size).await?;
        if questions.is_empty() {
            warn!(tag = %tag, "no questions to cache");
        } else {
            debug!(tag = %tag, count = questions.len(), "caching questions");
            self.cache.put(key, questions.clone(), ttl);
        }
        Ok(questions)
    }
}
