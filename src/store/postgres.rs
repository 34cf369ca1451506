// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, prelude::FromRow, types::Json};

use crate::{
    models::{
        assignment::{Assignment, ExamTakerAssignment, NewAssignment},
        group::{Group, GroupMember, NewGroup},
        module_version::{AssessmentModuleVersion, NewModuleVersion, QuestionType},
        progress::{ModuleProgress, NewModuleProgress, QuestionResponse},
    },
    store::{AttemptStore, ResponseWriter, StoreError, StoreResult},
};

const VERSION_COLUMNS: &str = "id, module_id, version_number, title, passing_score_percentage, \
     duration_in_minutes, questions, published_at";

const ASSIGNMENT_COLUMNS: &str = "id, title, group_id, start_date_utc, end_date_utc, \
     show_results_immediately, randomize_questions, randomize_answers, is_published";

const PROGRESS_COLUMNS: &str = "id, exam_taker_assignment_id, group_member_id, \
     assessment_module_version_id, has_started, started_at_utc, completed_at_utc, \
     duration_in_minutes, question_randomization_seed, answer_randomization_seed";

const RESPONSE_COLUMNS: &str = "id, module_progress_id, question_id, question_type, \
     selected_answer_ids, text_response, is_correct, responded_at_utc";

/// Helper struct for reading 'question_responses'; the type is stored as text.
#[derive(FromRow)]
struct ResponseRow {
    id: i64,
    module_progress_id: i64,
    question_id: i64,
    question_type: String,
    selected_answer_ids: Vec<i64>,
    text_response: Option<String>,
    is_correct: bool,
    responded_at_utc: DateTime<Utc>,
}

impl TryFrom<ResponseRow> for QuestionResponse {
    type Error = StoreError;

    fn try_from(row: ResponseRow) -> Result<Self, Self::Error> {
        let question_type = row
            .question_type
            .parse::<QuestionType>()
            .map_err(StoreError::Corrupt)?;
        Ok(QuestionResponse {
            id: row.id,
            module_progress_id: row.module_progress_id,
            question_id: row.question_id,
            question_type,
            selected_answer_ids: row.selected_answer_ids,
            text_response: row.text_response,
            is_correct: row.is_correct,
            responded_at_utc: row.responded_at_utc,
        })
    }
}

/// Postgres-backed store. Uniqueness and row locks live in the schema and
/// in the statements, not in process memory.
#[derive(Debug, Clone)]
pub struct PgAttemptStore {
    pool: PgPool,
}

impl PgAttemptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_version(
        &self,
        draft: &NewModuleVersion,
    ) -> Result<AssessmentModuleVersion, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO assessment_module_versions
            (module_id, version_number, title, passing_score_percentage, duration_in_minutes, questions, published_at)
            SELECT $1, COALESCE(MAX(version_number), 0) + 1, $2, $3, $4, $5, $6
            FROM assessment_module_versions
            WHERE module_id = $1
            RETURNING {VERSION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, AssessmentModuleVersion>(&sql)
            .bind(draft.module_id)
            .bind(&draft.title)
            .bind(draft.passing_score_percentage)
            .bind(draft.duration_in_minutes)
            .bind(Json(&draft.questions))
            .bind(draft.published_at)
            .fetch_one(&self.pool)
            .await
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl AttemptStore for PgAttemptStore {
    async fn publish_module_version(
        &self,
        draft: NewModuleVersion,
    ) -> StoreResult<AssessmentModuleVersion> {
        // Two publishes of one module can pick the same next number; the
        // loser retries once against the new maximum.
        let version = match self.insert_version(&draft).await {
            Err(e) if is_unique_violation(&e) => {
                tracing::warn!(
                    "Concurrent publish of module {}, retrying",
                    draft.module_id
                );
                self.insert_version(&draft).await
            }
            other => other,
        };

        version.map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "Module {} is being published concurrently",
                    draft.module_id
                ))
            } else {
                e.into()
            }
        })
    }

    async fn latest_module_version(
        &self,
        module_id: i64,
    ) -> StoreResult<Option<AssessmentModuleVersion>> {
        let sql = format!(
            "SELECT {VERSION_COLUMNS} FROM assessment_module_versions \
             WHERE module_id = $1 ORDER BY version_number DESC LIMIT 1"
        );
        let version = sqlx::query_as::<_, AssessmentModuleVersion>(&sql)
            .bind(module_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(version)
    }

    async fn module_version(&self, id: i64) -> StoreResult<Option<AssessmentModuleVersion>> {
        let sql = format!("SELECT {VERSION_COLUMNS} FROM assessment_module_versions WHERE id = $1");
        let version = sqlx::query_as::<_, AssessmentModuleVersion>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(version)
    }

    async fn create_group(&self, draft: NewGroup) -> StoreResult<(Group, Vec<GroupMember>)> {
        let mut tx = self.pool.begin().await?;

        let group = sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups (name, is_member_order_locked, wait_module_completion)
            VALUES ($1, $2, $3)
            RETURNING id, name, is_member_order_locked, wait_module_completion
            "#,
        )
        .bind(&draft.name)
        .bind(draft.is_member_order_locked)
        .bind(draft.wait_module_completion)
        .fetch_one(&mut *tx)
        .await?;

        let mut members = Vec::with_capacity(draft.module_ids.len());
        for (index, module_id) in draft.module_ids.iter().enumerate() {
            let member = sqlx::query_as::<_, GroupMember>(
                r#"
                INSERT INTO group_members (group_id, order_number, module_id)
                VALUES ($1, $2, $3)
                RETURNING id, group_id, order_number, module_id
                "#,
            )
            .bind(group.id)
            .bind(index as i32 + 1)
            .bind(module_id)
            .fetch_one(&mut *tx)
            .await?;
            members.push(member);
        }

        tx.commit().await?;
        Ok((group, members))
    }

    async fn group(&self, id: i64) -> StoreResult<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(
            "SELECT id, name, is_member_order_locked, wait_module_completion FROM groups WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    async fn group_members(&self, group_id: i64) -> StoreResult<Vec<GroupMember>> {
        let members = sqlx::query_as::<_, GroupMember>(
            r#"
            SELECT id, group_id, order_number, module_id
            FROM group_members
            WHERE group_id = $1
            ORDER BY order_number
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    async fn create_assignment(&self, draft: NewAssignment) -> StoreResult<Assignment> {
        let sql = format!(
            r#"
            INSERT INTO assignments
            (title, group_id, start_date_utc, end_date_utc, show_results_immediately,
             randomize_questions, randomize_answers, is_published)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        );
        let assignment = sqlx::query_as::<_, Assignment>(&sql)
            .bind(&draft.title)
            .bind(draft.group_id)
            .bind(draft.start_date_utc)
            .bind(draft.end_date_utc)
            .bind(draft.show_results_immediately)
            .bind(draft.randomize_questions)
            .bind(draft.randomize_answers)
            .bind(draft.is_published)
            .fetch_one(&self.pool)
            .await?;
        Ok(assignment)
    }

    async fn assignment(&self, id: i64) -> StoreResult<Option<Assignment>> {
        let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = $1");
        let assignment = sqlx::query_as::<_, Assignment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(assignment)
    }

    async fn delete_assignment(&self, id: i64) -> StoreResult<bool> {
        // Attempts, progress and responses go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM assignments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_or_create_exam_taker_assignment(
        &self,
        assignment_id: i64,
        exam_taker_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<ExamTakerAssignment> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let eta = sqlx::query_as::<_, ExamTakerAssignment>(
            r#"
            INSERT INTO exam_taker_assignments (assignment_id, exam_taker_id, created_at_utc)
            VALUES ($1, $2, $3)
            ON CONFLICT (assignment_id, exam_taker_id)
            DO UPDATE SET assignment_id = EXCLUDED.assignment_id
            RETURNING id, assignment_id, exam_taker_id, created_at_utc
            "#,
        )
        .bind(assignment_id)
        .bind(exam_taker_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(eta)
    }

    async fn find_exam_taker_assignment(
        &self,
        assignment_id: i64,
        exam_taker_id: i64,
    ) -> StoreResult<Option<ExamTakerAssignment>> {
        let eta = sqlx::query_as::<_, ExamTakerAssignment>(
            r#"
            SELECT id, assignment_id, exam_taker_id, created_at_utc
            FROM exam_taker_assignments
            WHERE assignment_id = $1 AND exam_taker_id = $2
            "#,
        )
        .bind(assignment_id)
        .bind(exam_taker_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(eta)
    }

    async fn module_progress(
        &self,
        exam_taker_assignment_id: i64,
    ) -> StoreResult<Vec<ModuleProgress>> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM module_progress WHERE exam_taker_assignment_id = $1"
        );
        let progress = sqlx::query_as::<_, ModuleProgress>(&sql)
            .bind(exam_taker_assignment_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(progress)
    }

    async fn start_module(&self, draft: NewModuleProgress) -> StoreResult<ModuleProgress> {
        // Concurrent starts collapse onto one row; the first start time wins.
        let sql = format!(
            r#"
            INSERT INTO module_progress
            (exam_taker_assignment_id, group_member_id, assessment_module_version_id, has_started,
             started_at_utc, duration_in_minutes, question_randomization_seed, answer_randomization_seed)
            VALUES ($1, $2, $3, TRUE, $4, $5, $6, $7)
            ON CONFLICT (exam_taker_assignment_id, group_member_id)
            DO UPDATE SET
                has_started = TRUE,
                started_at_utc = COALESCE(module_progress.started_at_utc, EXCLUDED.started_at_utc)
            RETURNING {PROGRESS_COLUMNS}
            "#
        );
        let progress = sqlx::query_as::<_, ModuleProgress>(&sql)
            .bind(draft.exam_taker_assignment_id)
            .bind(draft.group_member_id)
            .bind(draft.assessment_module_version_id)
            .bind(draft.started_at_utc)
            .bind(draft.duration_in_minutes)
            .bind(draft.question_randomization_seed)
            .bind(draft.answer_randomization_seed)
            .fetch_one(&self.pool)
            .await?;
        Ok(progress)
    }

    async fn complete_module(
        &self,
        progress_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<ModuleProgress> {
        let sql = format!(
            r#"
            UPDATE module_progress
            SET completed_at_utc = COALESCE(completed_at_utc, $2)
            WHERE id = $1
            RETURNING {PROGRESS_COLUMNS}
            "#
        );
        sqlx::query_as::<_, ModuleProgress>(&sql)
            .bind(progress_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("Module progress"))
    }

    async fn record_response(
        &self,
        progress_id: i64,
        writer: ResponseWriter,
    ) -> StoreResult<QuestionResponse> {
        let mut tx = self.pool.begin().await?;

        // Row lock: completion and other writes for this attempt wait here.
        let sql = format!("SELECT {PROGRESS_COLUMNS} FROM module_progress WHERE id = $1 FOR UPDATE");
        let progress = sqlx::query_as::<_, ModuleProgress>(&sql)
            .bind(progress_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound("Module progress"))?;

        let draft = writer(&progress)?;

        let sql = format!(
            r#"
            INSERT INTO question_responses
            (module_progress_id, question_id, question_type, selected_answer_ids, text_response,
             is_correct, responded_at_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (module_progress_id, question_id)
            DO UPDATE SET
                question_type = EXCLUDED.question_type,
                selected_answer_ids = EXCLUDED.selected_answer_ids,
                text_response = EXCLUDED.text_response,
                is_correct = EXCLUDED.is_correct,
                responded_at_utc = EXCLUDED.responded_at_utc
            RETURNING {RESPONSE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ResponseRow>(&sql)
            .bind(draft.module_progress_id)
            .bind(draft.question_id)
            .bind(draft.question_type.as_str())
            .bind(&draft.selected_answer_ids)
            .bind(&draft.text_response)
            .bind(draft.is_correct)
            .bind(draft.responded_at_utc)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn responses(&self, progress_id: i64) -> StoreResult<Vec<QuestionResponse>> {
        let sql = format!(
            "SELECT {RESPONSE_COLUMNS} FROM question_responses \
             WHERE module_progress_id = $1 ORDER BY question_id"
        );
        let rows = sqlx::query_as::<_, ResponseRow>(&sql)
            .bind(progress_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(QuestionResponse::try_from).collect()
    }
}
