use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::SourceError;
use crate::question::Question;
use crate::source::{validate_request, QuestionSource};

pub const DEFAULT_BASE_URL: &str = "https://api.stackexchange.com/2.3";
pub const DEFAULT_SITE: &str = "stackoverflow";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const THROTTLE_VIOLATION: u64 = 502;
const BAD_PARAMETER: u64 = 400;

#[derive(Debug, Clone)]
pub struct StackExchangeConfig {
    pub base_url: String,
    pub site: String,
    pub api_key: Option<String>,
}

impl Default for StackExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            site: DEFAULT_SITE.to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    items: Vec<ApiQuestion>,
    #[serde(default)]
    quota_remaining: Option<u64>,
    #[serde(default)]
    backoff: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiQuestion {
    question_id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    is_answered: bool,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    view_count: u64,
    #[serde(default)]
    answer_count: u64,
    #[serde(with = "chrono::serde::ts_seconds")]
    creation_date: DateTime<Utc>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    owner: Option<ApiOwner>,
}

#[derive(Debug, Deserialize)]
struct ApiOwner {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_id: Option<u64>,
    error_name: Option<String>,
    error_message: Option<String>,
}

impl From<ApiQuestion> for Question {
    fn from(q: ApiQuestion) -> Self {
        Self {
            id: q.question_id,
            title: q.title,
            url: q.link,
            is_answered: q.is_answered,
            score: q.score,
            view_count: q.view_count,
            answer_count: q.answer_count,
            created_at: q.creation_date,
            tags: q.tags,
            author_name: q
                .owner
                .and_then(|o| o.display_name)
                .unwrap_or_else(|| "Unknown".to_string()),
        }
    }
}

/// HTTP client for the Stack Exchange `/questions` endpoint.
#[derive(Debug, Clone)]
pub struct StackExchangeClient {
    client: Client,
    config: StackExchangeConfig,
}

impl StackExchangeClient {
    pub fn new(client: Client, config: StackExchangeConfig) -> Self {
        Self { client, config }
    }

    /// Builds a client with the default timeout and user agent.
    pub fn with_defaults(config: StackExchangeConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("tagwatch/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()?;
        Ok(Self::new(client, config))
    }

    fn questions_url(&self) -> String {
        format!("{}/questions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl QuestionSource for StackExchangeClient {
    async fn fetch_by_tag(
        &self,
        tag: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Question>, SourceError> {
        let tag = validate_request(tag, page, page_size)?;
        info!(tag = %tag, page, page_size, "fetching questions");

        let page = page.to_string();
        let page_size = page_size.to_string();
        let mut query: Vec<(&str, &str)> = vec![
            ("page", page.as_str()),
            ("pagesize", page_size.as_str()),
            ("order", "desc"),
            ("sort", "creation"),
            ("tagged", tag.as_str()),
            ("site", self.config.site.as_str()),
        ];
        if let Some(key) = &self.config.api_key {
            query.push(("key", key.as_str()));
        }

        let response = self
            .client
            .get(self.questions_url())
            .query(&query)
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(classify_failure(status, &bytes));
        }
        if bytes.iter().all(u8::is_ascii_whitespace) {
            warn!(tag = %tag, "empty response body");
            return Ok(Vec::new());
        }

        let body: ApiResponse = serde_json::from_slice(&bytes)?;
        if body.quota_remaining == Some(0) {
            warn!(tag = %tag, "request quota exhausted");
        }
        if let Some(secs) = body.backoff {
            warn!(tag = %tag, backoff = secs, "source asked to back off");
        }

        let mut questions: Vec<Question> = body.items.into_iter().map(Question::from).collect();
        questions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        info!(tag = %tag, count = questions.len(), "fetched questions");
        Ok(questions)
    }
}

fn classify_failure(status: StatusCode, bytes: &[u8]) -> SourceError {
    let body = serde_json::from_slice::<ApiErrorBody>(bytes).ok();
    let error_id = body.as_ref().and_then(|b| b.error_id);
    let throttled = status == StatusCode::TOO_MANY_REQUESTS
        || error_id == Some(THROTTLE_VIOLATION)
        || body
            .as_ref()
            .and_then(|b| b.error_name.as_deref())
            .is_some_and(|name| name == "throttle_violation");
    let message = body
        .as_ref()
        .and_then(|b| b.error_message.clone())
        .unwrap_or_else(|| status.to_string());

    if throttled {
        warn!(%status, "rate limited by source");
        SourceError::RateLimited {
            retry_after: retry_after_from(&message),
        }
    } else if error_id == Some(BAD_PARAMETER) {
        SourceError::InvalidArgument(message)
    } else {
        SourceError::Unavailable(format!("HTTP {status}: {message}"))
    }
}

// Throttle messages read "too many requests from this IP, more requests available in 123 seconds".
fn retry_after_from(message: &str) -> Option<u64> {
    let (_, tail) = message.split_once("available in ")?;
    tail.split_whitespace().next()?.parse().ok()
}
