use std::collections::HashSet;
use std::time::Duration;

use crate::question::Question;
use crate::subscription::{to_delta, TagSubscription};

/// Picks the questions of a poll result that were not seen by `sub` yet,
/// in ascending id order.
///
/// A question is new when its id is above the subscription watermark, or
/// when it was created less than `grace` before the last check and has not
/// been notified already. The grace window catches items that were indexed
/// late by the source.
pub fn detect_new(questions: &[Question], sub: &TagSubscription, grace: Duration) -> Vec<Question> {
    let threshold = sub
        .last_checked
        .checked_sub_signed(to_delta(grace))
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);

    let mut seen = HashSet::new();
    let mut fresh: Vec<Question> = questions
        .iter()
        .filter(|q| seen.insert(q.id))
        .filter(|q| {
            q.id > sub.last_question_id || (q.created_at > threshold && !sub.was_notified(q.id))
        })
        .cloned()
        .collect();
    fresh.sort_by_key(|q| q.id);
    fresh
}
