// src/models/module_version.rs

use std::{collections::HashSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// How a question expects to be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    FreeText,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::FreeText => "free_text",
        }
    }

    pub fn is_choice(&self) -> bool {
        !matches!(self, QuestionType::FreeText)
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_choice" => Ok(QuestionType::SingleChoice),
            "multiple_choice" => Ok(QuestionType::MultipleChoice),
            "free_text" => Ok(QuestionType::FreeText),
            other => Err(format!("unknown question type '{}'", other)),
        }
    }
}

/// One possible answer of a question, including its correctness flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: i64,
    pub text: String,
    pub is_correct: bool,
}

/// A question as authored. This is the administrator view: it carries the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub question_type: QuestionType,
    pub text: String,
    pub answers: Vec<AnswerOption>,
}

impl Question {
    pub fn correct_answer_ids(&self) -> HashSet<i64> {
        self.answers
            .iter()
            .filter(|a| a.is_correct)
            .map(|a| a.id)
            .collect()
    }

    pub fn has_answer(&self, answer_id: i64) -> bool {
        self.answers.iter().any(|a| a.id == answer_id)
    }
}

/// Represents the 'assessment_module_versions' table.
///
/// A published version is never mutated; module progress pins to its id.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AssessmentModuleVersion {
    pub id: i64,
    pub module_id: i64,
    pub version_number: i32,
    pub title: String,
    pub passing_score_percentage: i32,
    /// 0 means untimed.
    pub duration_in_minutes: i32,
    /// Stored as a JSONB array.
    pub questions: Json<Vec<Question>>,
    pub published_at: DateTime<Utc>,
}

impl AssessmentModuleVersion {
    pub fn question(&self, question_id: i64) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }
}

/// Answer as shown to an exam taker (no correctness flag).
#[derive(Debug, Clone, Serialize)]
pub struct ExamTakerAnswer {
    pub id: i64,
    pub text: String,
}

/// Question as shown to an exam taker.
///
/// Free-text questions expose no answers at all, their answers are the key.
#[derive(Debug, Clone, Serialize)]
pub struct ExamTakerQuestion {
    pub id: i64,
    pub question_type: QuestionType,
    pub text: String,
    pub answers: Vec<ExamTakerAnswer>,
}

impl From<&Question> for ExamTakerQuestion {
    fn from(q: &Question) -> Self {
        let answers = if q.question_type.is_choice() {
            q.answers
                .iter()
                .map(|a| ExamTakerAnswer {
                    id: a.id,
                    text: a.text.clone(),
                })
                .collect()
        } else {
            Vec::new()
        };

        Self {
            id: q.id,
            question_type: q.question_type,
            text: q.text.clone(),
            answers,
        }
    }
}

/// Draft handed to the store when publishing.
#[derive(Debug, Clone)]
pub struct NewModuleVersion {
    pub module_id: i64,
    pub title: String,
    pub passing_score_percentage: i32,
    pub duration_in_minutes: i32,
    pub questions: Vec<Question>,
    pub published_at: DateTime<Utc>,
}

/// DTO for publishing a new version of a module.
#[derive(Debug, Deserialize, Validate)]
pub struct PublishModuleRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(range(min = 0, max = 100))]
    pub passing_score_percentage: i32,
    #[validate(range(min = 0, max = 1440))]
    pub duration_in_minutes: i32,
    #[validate(custom(function = validate_questions))]
    pub questions: Vec<Question>,
}

fn validate_questions(questions: &[Question]) -> Result<(), validator::ValidationError> {
    let mut question_ids = HashSet::new();
    for q in questions {
        if !question_ids.insert(q.id) {
            return Err(validator::ValidationError::new("duplicate_question_id"));
        }
        if q.text.trim().is_empty() || q.text.chars().count() > 2000 {
            return Err(validator::ValidationError::new("invalid_question_text"));
        }

        let mut answer_ids = HashSet::new();
        for a in &q.answers {
            if !answer_ids.insert(a.id) {
                return Err(validator::ValidationError::new("duplicate_answer_id"));
            }
            if a.text.chars().count() > 500 {
                return Err(validator::ValidationError::new("answer_too_long"));
            }
        }

        let correct = q.answers.iter().filter(|a| a.is_correct).count();
        match q.question_type {
            QuestionType::SingleChoice if correct != 1 => {
                return Err(validator::ValidationError::new(
                    "single_choice_needs_one_correct_answer",
                ));
            }
            QuestionType::MultipleChoice | QuestionType::FreeText if correct == 0 => {
                return Err(validator::ValidationError::new("missing_correct_answer"));
            }
            _ => {}
        }
    }
    Ok(())
}
