// src/models/assignment.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'assignments' table: a time-boxed offering of one group.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub title: String,
    pub group_id: i64,
    pub start_date_utc: DateTime<Utc>,
    pub end_date_utc: DateTime<Utc>,
    pub show_results_immediately: bool,
    pub randomize_questions: bool,
    pub randomize_answers: bool,
    pub is_published: bool,
}

/// Represents the 'exam_taker_assignments' table.
/// One row per (assignment, exam taker), created on first access.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamTakerAssignment {
    pub id: i64,
    pub assignment_id: i64,
    pub exam_taker_id: i64,
    pub created_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub title: String,
    pub group_id: i64,
    pub start_date_utc: DateTime<Utc>,
    pub end_date_utc: DateTime<Utc>,
    pub show_results_immediately: bool,
    pub randomize_questions: bool,
    pub randomize_answers: bool,
    pub is_published: bool,
}

/// DTO for creating an assignment.
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = validate_window))]
pub struct CreateAssignmentRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub group_id: i64,
    pub start_date_utc: DateTime<Utc>,
    pub end_date_utc: DateTime<Utc>,
    #[serde(default)]
    pub show_results_immediately: bool,
    #[serde(default)]
    pub randomize_questions: bool,
    #[serde(default)]
    pub randomize_answers: bool,
    #[serde(default)]
    pub is_published: bool,
}

fn validate_window(req: &CreateAssignmentRequest) -> Result<(), validator::ValidationError> {
    if req.end_date_utc <= req.start_date_utc {
        return Err(validator::ValidationError::new("end_must_follow_start"));
    }
    Ok(())
}

impl From<CreateAssignmentRequest> for NewAssignment {
    fn from(req: CreateAssignmentRequest) -> Self {
        Self {
            title: req.title,
            group_id: req.group_id,
            start_date_utc: req.start_date_utc,
            end_date_utc: req.end_date_utc,
            show_results_immediately: req.show_results_immediately,
            randomize_questions: req.randomize_questions,
            randomize_answers: req.randomize_answers,
            is_published: req.is_published,
        }
    }
}
