// src/models/progress.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{
    engine::{scoring::ScoreSummary, status::ModuleStatus},
    models::module_version::{ExamTakerQuestion, Question, QuestionType},
};

/// Represents the 'module_progress' table.
/// One row per (exam taker assignment, group member). Score is never stored here.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ModuleProgress {
    pub id: i64,
    pub exam_taker_assignment_id: i64,
    pub group_member_id: i64,
    /// Pinned when the module is started.
    pub assessment_module_version_id: i64,
    pub has_started: bool,
    pub started_at_utc: Option<DateTime<Utc>>,
    pub completed_at_utc: Option<DateTime<Utc>>,
    pub duration_in_minutes: i32,
    pub question_randomization_seed: Option<i64>,
    pub answer_randomization_seed: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewModuleProgress {
    pub exam_taker_assignment_id: i64,
    pub group_member_id: i64,
    pub assessment_module_version_id: i64,
    pub started_at_utc: DateTime<Utc>,
    pub duration_in_minutes: i32,
    pub question_randomization_seed: Option<i64>,
    pub answer_randomization_seed: Option<i64>,
}

/// Represents the 'question_responses' table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub id: i64,
    pub module_progress_id: i64,
    pub question_id: i64,
    /// Type of the question when the answer was written.
    pub question_type: QuestionType,
    pub selected_answer_ids: Vec<i64>,
    pub text_response: Option<String>,
    pub is_correct: bool,
    pub responded_at_utc: DateTime<Utc>,
}

/// Graded answer ready to be upserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestionResponse {
    pub module_progress_id: i64,
    pub question_id: i64,
    pub question_type: QuestionType,
    pub selected_answer_ids: Vec<i64>,
    pub text_response: Option<String>,
    pub is_correct: bool,
    pub responded_at_utc: DateTime<Utc>,
}

/// DTO for submitting an answer.
///
/// Unknown fields are refused, so a request can never smuggle in its own timestamp.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SubmitResponseRequest {
    pub question_id: i64,
    #[validate(length(max = 100))]
    pub selected_answer_ids: Option<Vec<i64>>,
    pub text_response: Option<String>,
}

/// An exam taker's own answer, without grading.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseView {
    pub question_id: i64,
    pub selected_answer_ids: Vec<i64>,
    pub text_response: Option<String>,
    pub responded_at_utc: DateTime<Utc>,
}

impl From<&QuestionResponse> for ResponseView {
    fn from(r: &QuestionResponse) -> Self {
        Self {
            question_id: r.question_id,
            selected_answer_ids: r.selected_answer_ids.clone(),
            text_response: r.text_response.clone(),
            responded_at_utc: r.responded_at_utc,
        }
    }
}

/// One row of the module list of an assignment.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleSummary {
    pub group_member_id: i64,
    pub order_number: i32,
    pub module_id: i64,
    pub status: ModuleStatus,
    /// False for `Locked` and `Scheduled` modules.
    pub is_accessible: bool,
    pub time_remaining_seconds: Option<i64>,
}

/// Exam-taker view of one module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleStateResponse {
    pub assignment_id: i64,
    pub group_member_id: i64,
    pub order_number: i32,
    pub module_id: i64,
    pub status: ModuleStatus,
    pub started_at_utc: Option<DateTime<Utc>>,
    pub completed_at_utc: Option<DateTime<Utc>>,
    pub duration_in_minutes: Option<i32>,
    pub time_remaining_seconds: Option<i64>,
    pub elapsed_seconds: Option<i64>,
    /// Empty until the module is started.
    pub questions: Vec<ExamTakerQuestion>,
    pub current_responses: Vec<ResponseView>,
}

/// Result of completing a module.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionResponse {
    pub group_member_id: i64,
    pub completed_at_utc: Option<DateTime<Utc>>,
    pub score: Option<ScoreSummary>,
    pub results_withheld: bool,
}

impl CompletionResponse {
    /// Drops the score for assignments that hide results until later.
    pub fn withheld(self) -> Self {
        Self {
            score: None,
            results_withheld: true,
            ..self
        }
    }
}

/// Administrator view of one module of an attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AdminModuleReport {
    pub group_member_id: i64,
    pub order_number: i32,
    pub module_id: i64,
    pub status: ModuleStatus,
    pub progress: Option<ModuleProgress>,
    pub score: Option<ScoreSummary>,
    pub questions: Vec<Question>,
    pub responses: Vec<QuestionResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminProgressReport {
    pub assignment_id: i64,
    pub exam_taker_id: i64,
    pub exam_taker_assignment_id: Option<i64>,
    pub modules: Vec<AdminModuleReport>,
}
