// src/engine/error.rs

use thiserror::Error;

use crate::engine::status::ModuleStatus;

/// Deterministic rejections raised by the engine. None of them are worth retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Module is not accessible: {0}")]
    NotAccessible(ModuleStatus),

    #[error("Assignment window has closed")]
    AssignmentClosed,

    #[error("Module time limit has elapsed")]
    Expired,

    #[error("Module is already completed")]
    ImmutableState,

    #[error("Module has not been started")]
    NotStarted,

    #[error("Invalid response: {0}")]
    InvalidResponseShape(String),

    #[error("Question {0} is not part of this module")]
    UnknownQuestion(i64),
}

impl EngineError {
    /// Stable machine-readable name, sent alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotAccessible(_) => "not_accessible",
            EngineError::AssignmentClosed => "assignment_closed",
            EngineError::Expired => "expired",
            EngineError::ImmutableState => "immutable_state",
            EngineError::NotStarted => "not_started",
            EngineError::InvalidResponseShape(_) => "invalid_response_shape",
            EngineError::UnknownQuestion(_) => "unknown_question",
        }
    }
}
