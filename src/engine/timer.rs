// src/engine/timer.rs

use chrono::{DateTime, Duration, Utc};

use crate::models::progress::ModuleProgress;

/// Marks the module as started at `now`, once.
///
/// Returns the effective start time. A second call returns the stored value
/// and leaves the record alone, so retries cannot restart the time limit.
pub fn start(progress: &mut ModuleProgress, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(started_at) = progress.started_at_utc {
        return started_at;
    }
    progress.has_started = true;
    progress.started_at_utc = Some(now);
    now
}

/// `started_at_utc + duration`, or `None` for untimed or unstarted modules.
pub fn deadline(progress: &ModuleProgress) -> Option<DateTime<Utc>> {
    if progress.duration_in_minutes <= 0 {
        return None;
    }
    progress
        .started_at_utc
        .map(|started_at| started_at + Duration::minutes(i64::from(progress.duration_in_minutes)))
}

pub fn remaining_time(progress: &ModuleProgress, now: DateTime<Utc>) -> Option<Duration> {
    deadline(progress).map(|deadline| (deadline - now).max(Duration::zero()))
}

/// Time spent so far, frozen at completion.
pub fn elapsed_time(progress: &ModuleProgress, now: DateTime<Utc>) -> Option<Duration> {
    let started_at = progress.started_at_utc?;
    let until = progress.completed_at_utc.unwrap_or(now);
    Some((until - started_at).max(Duration::zero()))
}

/// Started, not completed, and at or past the deadline.
pub fn is_expired(progress: &ModuleProgress, now: DateTime<Utc>) -> bool {
    progress.completed_at_utc.is_none() && deadline(progress).is_some_and(|deadline| now >= deadline)
}
