use thiserror::Error;

/// Failures surfaced by a [`QuestionSource`](crate::source::QuestionSource).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("question source unavailable: {0}")]
    Unavailable(String),
    #[error("invalid response from question source: {0}")]
    InvalidResponse(String),
    #[error("question source rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SourceError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SourceError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::InvalidResponse(err.to_string())
        } else {
            SourceError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::InvalidResponse(err.to_string())
    }
}

/// Failure reported by the presentation layer when surfacing an alert.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert surface unavailable: {0}")]
    Unavailable(String),
    #[error("alert io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("unknown setting key: {0}")]
    UnknownKey(String),
    #[error("setting {key} expects a {expected} value")]
    TypeMismatch { key: String, expected: &'static str },
}
