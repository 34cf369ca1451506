// src/engine/recorder.rs

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::{
    config::FREE_TEXT_MAX_LENGTH,
    engine::{EngineError, status::ModuleStatus},
    models::{
        module_version::{AssessmentModuleVersion, Question, QuestionType},
        progress::{ModuleProgress, NewQuestionResponse},
    },
};

/// A response payload after it passed the shape checks for its question type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedAnswer {
    Choices(Vec<i64>),
    Text(String),
}

/// Refuses writes unless the module is in progress.
///
/// Completion is checked before status so a finished module always reports
/// `ImmutableState`, whatever else changed around it.
pub fn ensure_writable(status: ModuleStatus, progress: &ModuleProgress) -> Result<(), EngineError> {
    if progress.completed_at_utc.is_some() {
        return Err(EngineError::ImmutableState);
    }
    check_status(status)
}

/// Maps a status to the error a write in that status gets.
pub fn check_status(status: ModuleStatus) -> Result<(), EngineError> {
    match status {
        ModuleStatus::InProgress => Ok(()),
        ModuleStatus::TimeElapsed => Err(EngineError::Expired),
        ModuleStatus::Completed => Err(EngineError::ImmutableState),
        ModuleStatus::NotStarted => Err(EngineError::NotStarted),
        ModuleStatus::Locked
        | ModuleStatus::Scheduled
        | ModuleStatus::WaitForModuleDurationToElapse => Err(EngineError::NotAccessible(status)),
    }
}

/// Checks the payload against the question's type contract.
pub fn normalize(
    question: &Question,
    selected_answer_ids: Option<&[i64]>,
    text_response: Option<&str>,
) -> Result<RecordedAnswer, EngineError> {
    let invalid = |msg: &str| Err(EngineError::InvalidResponseShape(msg.to_string()));

    match question.question_type {
        QuestionType::SingleChoice | QuestionType::MultipleChoice => {
            if text_response.is_some() {
                return invalid("choice questions take selected_answer_ids, not text");
            }
            let ids = selected_answer_ids.unwrap_or_default();
            if question.question_type == QuestionType::SingleChoice && ids.len() != 1 {
                return invalid("single choice questions take exactly one answer");
            }
            if ids.is_empty() {
                return invalid("multiple choice questions take at least one answer");
            }
            let distinct: HashSet<i64> = ids.iter().copied().collect();
            if distinct.len() != ids.len() {
                return invalid("selected answers must be distinct");
            }
            if let Some(unknown) = ids.iter().find(|id| !question.has_answer(**id)) {
                return Err(EngineError::InvalidResponseShape(format!(
                    "answer {} does not belong to question {}",
                    unknown, question.id
                )));
            }
            Ok(RecordedAnswer::Choices(ids.to_vec()))
        }
        QuestionType::FreeText => {
            if selected_answer_ids.is_some_and(|ids| !ids.is_empty()) {
                return invalid("free text questions take text_response, not answers");
            }
            let text = text_response.map(str::trim).unwrap_or_default();
            if text.is_empty() {
                return invalid("text response must not be empty");
            }
            if text.chars().count() > FREE_TEXT_MAX_LENGTH {
                return Err(EngineError::InvalidResponseShape(format!(
                    "text response exceeds {} characters",
                    FREE_TEXT_MAX_LENGTH
                )));
            }
            Ok(RecordedAnswer::Text(text.to_string()))
        }
    }
}

/// Choice answers match when the selected set equals the correct set, in any
/// order. Free text matches an accepted answer after trimming, case-sensitive.
pub fn is_correct(question: &Question, answer: &RecordedAnswer) -> bool {
    match answer {
        RecordedAnswer::Choices(ids) => {
            let selected: HashSet<i64> = ids.iter().copied().collect();
            let correct = question.correct_answer_ids();
            !correct.is_empty() && selected == correct
        }
        RecordedAnswer::Text(text) => question
            .answers
            .iter()
            .filter(|a| a.is_correct)
            .any(|a| a.text.trim() == text),
    }
}

/// Validates and grades one answer against the pinned version.
///
/// `status` must be resolved from the same `progress` the caller is about to
/// write, under the attempt's write lock.
pub fn record(
    status: ModuleStatus,
    progress: &ModuleProgress,
    version: &AssessmentModuleVersion,
    question_id: i64,
    selected_answer_ids: Option<&[i64]>,
    text_response: Option<&str>,
    now: DateTime<Utc>,
) -> Result<NewQuestionResponse, EngineError> {
    ensure_writable(status, progress)?;

    let question = version
        .question(question_id)
        .ok_or(EngineError::UnknownQuestion(question_id))?;
    let answer = normalize(question, selected_answer_ids, text_response)?;
    let correct = is_correct(question, &answer);

    let (selected_answer_ids, text_response) = match answer {
        RecordedAnswer::Choices(ids) => (ids, None),
        RecordedAnswer::Text(text) => (Vec::new(), Some(text)),
    };

    Ok(NewQuestionResponse {
        module_progress_id: progress.id,
        question_id,
        question_type: question.question_type,
        selected_answer_ids,
        text_response,
        is_correct: correct,
        responded_at_utc: now,
    })
}
