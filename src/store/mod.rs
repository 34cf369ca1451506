// src/store/mod.rs

//! Persistence for authored content and attempts.
//!
//! Writes that touch one module progress record are serialized per record, so
//! a response can never land after the module was completed.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    engine::EngineError,
    models::{
        assignment::{Assignment, ExamTakerAssignment, NewAssignment},
        group::{Group, GroupMember, NewGroup},
        module_version::{AssessmentModuleVersion, NewModuleVersion},
        progress::{ModuleProgress, NewModuleProgress, NewQuestionResponse, QuestionResponse},
    },
};

pub use memory::MemoryAttemptStore;
pub use postgres::PgAttemptStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Rejected(#[from] EngineError),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Grades a response against the freshly locked progress record.
pub type ResponseWriter =
    Box<dyn FnOnce(&ModuleProgress) -> Result<NewQuestionResponse, EngineError> + Send>;

#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Stores a new immutable version; `version_number` is the module's next one.
    async fn publish_module_version(
        &self,
        draft: NewModuleVersion,
    ) -> StoreResult<AssessmentModuleVersion>;

    async fn latest_module_version(
        &self,
        module_id: i64,
    ) -> StoreResult<Option<AssessmentModuleVersion>>;

    async fn module_version(&self, id: i64) -> StoreResult<Option<AssessmentModuleVersion>>;

    async fn create_group(&self, draft: NewGroup) -> StoreResult<(Group, Vec<GroupMember>)>;

    async fn group(&self, id: i64) -> StoreResult<Option<Group>>;

    /// Members sorted by `order_number`.
    async fn group_members(&self, group_id: i64) -> StoreResult<Vec<GroupMember>>;

    async fn create_assignment(&self, draft: NewAssignment) -> StoreResult<Assignment>;

    async fn assignment(&self, id: i64) -> StoreResult<Option<Assignment>>;

    /// Removes the assignment with every attempt, progress and response under it.
    async fn delete_assignment(&self, id: i64) -> StoreResult<bool>;

    /// Atomic get-or-create of the (assignment, exam taker) record.
    async fn get_or_create_exam_taker_assignment(
        &self,
        assignment_id: i64,
        exam_taker_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<ExamTakerAssignment>;

    async fn find_exam_taker_assignment(
        &self,
        assignment_id: i64,
        exam_taker_id: i64,
    ) -> StoreResult<Option<ExamTakerAssignment>>;

    async fn module_progress(&self, exam_taker_assignment_id: i64)
    -> StoreResult<Vec<ModuleProgress>>;

    /// Atomic get-or-create keyed by (exam taker assignment, group member).
    ///
    /// An existing record keeps its pinned version, seeds and start time; the
    /// draft only fills a start time that was never set.
    async fn start_module(&self, draft: NewModuleProgress) -> StoreResult<ModuleProgress>;

    /// Sets `completed_at_utc` unless already set. Returns the stored record.
    async fn complete_module(
        &self,
        progress_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<ModuleProgress>;

    /// Locks the progress record, lets `writer` grade against it, then upserts
    /// the response for (progress, question).
    async fn record_response(
        &self,
        progress_id: i64,
        writer: ResponseWriter,
    ) -> StoreResult<QuestionResponse>;

    async fn responses(&self, progress_id: i64) -> StoreResult<Vec<QuestionResponse>>;
}
