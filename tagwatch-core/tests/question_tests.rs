mod common;

use chrono::{Duration, Utc};
use tagwatch_core::{Question, QuickFilter};

use common::question_at;

fn with(id: u64, edit: impl FnOnce(&mut Question)) -> Question {
    let mut q = question_at(id, Utc::now());
    edit(&mut q);
    q
}

#[test]
fn score_threshold_is_inclusive() {
    let now = Utc::now();
    assert!(!QuickFilter::HighScore.matches(&with(1, |q| q.score = 9), now));
    assert!(QuickFilter::HighScore.matches(&with(1, |q| q.score = 10), now));
}

#[test]
fn view_threshold_is_inclusive() {
    let now = Utc::now();
    assert!(!QuickFilter::Popular.matches(&with(1, |q| q.view_count = 99), now));
    assert!(QuickFilter::Popular.matches(&with(1, |q| q.view_count = 100), now));
}

#[test]
fn answer_threshold_is_inclusive() {
    let now = Utc::now();
    assert!(!QuickFilter::ManyAnswers.matches(&with(1, |q| q.answer_count = 4), now));
    assert!(QuickFilter::ManyAnswers.matches(&with(1, |q| q.answer_count = 5), now));
}

#[test]
fn last_week_includes_exactly_seven_days() {
    let now = Utc::now();
    let edge = question_at(1, now - Duration::days(7));
    let older = question_at(2, now - Duration::days(7) - Duration::seconds(1));

    assert!(QuickFilter::LastWeek.matches(&edge, now));
    assert!(!QuickFilter::LastWeek.matches(&older, now));
}

#[test]
fn answered_and_unanswered_split_the_list() {
    let now = Utc::now();
    let answered = with(1, |q| q.is_answered = true);
    let open = with(2, |q| q.is_answered = false);

    assert!(QuickFilter::Answered.matches(&answered, now));
    assert!(!QuickFilter::Answered.matches(&open, now));
    assert!(QuickFilter::Unanswered.matches(&open, now));
    assert!(QuickFilter::All.matches(&open, now));
}

#[test]
fn apply_keeps_the_original_order() {
    let now = Utc::now();
    let questions = vec![
        with(30, |q| q.score = 12),
        with(10, |q| q.score = 1),
        with(20, |q| q.score = 40),
        with(5, |q| q.score = 10),
    ];

    let ids: Vec<u64> = QuickFilter::HighScore
        .apply(&questions, now)
        .iter()
        .map(|q| q.id)
        .collect();
    assert_eq!(ids, vec![30, 20, 5]);
    assert_eq!(QuickFilter::All.apply(&questions, now), questions);
}

#[test]
fn every_filter_has_a_distinct_label() {
    let mut labels: Vec<&str> = QuickFilter::ALL.iter().map(QuickFilter::label).collect();
    labels.sort_unstable();
    labels.dedup();
    assert_eq!(labels.len(), QuickFilter::ALL.len());
    assert_eq!(QuickFilter::default(), QuickFilter::All);
}
