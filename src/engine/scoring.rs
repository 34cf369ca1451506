// src/engine/scoring.rs

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{
    module_version::AssessmentModuleVersion,
    progress::{ModuleProgress, QuestionResponse},
};

/// Score of one module attempt. Always derived from responses, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreSummary {
    pub correct_count: usize,
    pub total_questions: usize,
    pub score_percentage: i32,
    pub passed: bool,
}

/// Rounded percentage. A zero-question module divides by 1 and scores 0.
fn calculate_percentage(correct_count: usize, total_questions: usize) -> i32 {
    let denominator = total_questions.max(1);
    ((correct_count as f64 / denominator as f64) * 100.0).round() as i32
}

/// Scores the recorded responses against the pinned version.
///
/// A response only counts if its question is still in the version with the
/// same type it was graded under.
pub fn score(version: &AssessmentModuleVersion, responses: &[QuestionResponse]) -> ScoreSummary {
    let correct_count = responses
        .iter()
        .filter(|r| r.is_correct)
        .filter(|r| {
            version
                .question(r.question_id)
                .is_some_and(|q| q.question_type == r.question_type)
        })
        .count();
    let total_questions = version.question_count();
    let score_percentage = calculate_percentage(correct_count, total_questions);

    ScoreSummary {
        correct_count,
        total_questions,
        score_percentage,
        passed: score_percentage >= version.passing_score_percentage,
    }
}

/// Sets `completed_at_utc` once. Returns whether this call completed it.
pub fn complete(progress: &mut ModuleProgress, now: DateTime<Utc>) -> bool {
    if progress.completed_at_utc.is_some() {
        return false;
    }
    progress.completed_at_utc = Some(now);
    true
}
