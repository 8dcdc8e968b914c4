use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A question record as returned by the external source. Identity is `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub id: u64,
    pub title: String,
    pub url: String,
    pub is_answered: bool,
    pub score: i64,
    pub view_count: u64,
    pub answer_count: u64,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub author_name: String,
}

impl Question {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

const HIGH_SCORE: i64 = 10;
const POPULAR_VIEWS: u64 = 100;
const MANY_ANSWERS: u64 = 5;
const LAST_WEEK_DAYS: i64 = 7;

/// Predefined filters applied to a fetched question list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum QuickFilter {
    #[default]
    All,
    Answered,
    Unanswered,
    HighScore,
    Popular,
    ManyAnswers,
    LastWeek,
}

impl QuickFilter {
    pub const ALL: [QuickFilter; 7] = [
        QuickFilter::All,
        QuickFilter::Answered,
        QuickFilter::Unanswered,
        QuickFilter::HighScore,
        QuickFilter::Popular,
        QuickFilter::ManyAnswers,
        QuickFilter::LastWeek,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            QuickFilter::All => "All Questions",
            QuickFilter::Answered => "Answered",
            QuickFilter::Unanswered => "Unanswered",
            QuickFilter::HighScore => "High Score (10+)",
            QuickFilter::Popular => "Popular (100+ views)",
            QuickFilter::ManyAnswers => "Many Answers (5+)",
            QuickFilter::LastWeek => "New (Last 7 days)",
        }
    }

    pub fn matches(&self, question: &Question, now: DateTime<Utc>) -> bool {
        match self {
            QuickFilter::All => true,
            QuickFilter::Answered => question.is_answered,
            QuickFilter::Unanswered => !question.is_answered,
            QuickFilter::HighScore => question.score >= HIGH_SCORE,
            QuickFilter::Popular => question.view_count >= POPULAR_VIEWS,
            QuickFilter::ManyAnswers => question.answer_count >= MANY_ANSWERS,
            QuickFilter::LastWeek => question.created_at >= now - Duration::days(LAST_WEEK_DAYS),
        }
    }

    /// Keeps the matching questions, preserving their order.
    pub fn apply(&self, questions: &[Question], now: DateTime<Utc>) -> Vec<Question> {
        questions
            .iter()
            .filter(|q| self.matches(q, now))
            .cloned()
            .collect()
    }
}
