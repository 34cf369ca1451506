// src/store/memory.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tokio::sync::Mutex;

use crate::{
    models::{
        assignment::{Assignment, ExamTakerAssignment, NewAssignment},
        group::{Group, GroupMember, NewGroup},
        module_version::{AssessmentModuleVersion, NewModuleVersion},
        progress::{ModuleProgress, NewModuleProgress, QuestionResponse},
    },
    store::{AttemptStore, ResponseWriter, StoreError, StoreResult},
};

#[derive(Debug, Default)]
struct Tables {
    last_id: i64,
    versions: Vec<AssessmentModuleVersion>,
    groups: Vec<Group>,
    members: Vec<GroupMember>,
    assignments: Vec<Assignment>,
    exam_taker_assignments: Vec<ExamTakerAssignment>,
    progress: Vec<ModuleProgress>,
    responses: Vec<QuestionResponse>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// Process-local store. One lock over all tables makes every call atomic.
#[derive(Debug, Default)]
pub struct MemoryAttemptStore {
    tables: Mutex<Tables>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn publish_module_version(
        &self,
        draft: NewModuleVersion,
    ) -> StoreResult<AssessmentModuleVersion> {
        let mut t = self.tables.lock().await;
        let version_number = t
            .versions
            .iter()
            .filter(|v| v.module_id == draft.module_id)
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
            + 1;
        let version = AssessmentModuleVersion {
            id: t.next_id(),
            module_id: draft.module_id,
            version_number,
            title: draft.title,
            passing_score_percentage: draft.passing_score_percentage,
            duration_in_minutes: draft.duration_in_minutes,
            questions: Json(draft.questions),
            published_at: draft.published_at,
        };
        t.versions.push(version.clone());
        Ok(version)
    }

    async fn latest_module_version(
        &self,
        module_id: i64,
    ) -> StoreResult<Option<AssessmentModuleVersion>> {
        let t = self.tables.lock().await;
        Ok(t.versions
            .iter()
            .filter(|v| v.module_id == module_id)
            .max_by_key(|v| v.version_number)
            .cloned())
    }

    async fn module_version(&self, id: i64) -> StoreResult<Option<AssessmentModuleVersion>> {
        let t = self.tables.lock().await;
        Ok(t.versions.iter().find(|v| v.id == id).cloned())
    }

    async fn create_group(&self, draft: NewGroup) -> StoreResult<(Group, Vec<GroupMember>)> {
        let mut t = self.tables.lock().await;
        let group = Group {
            id: t.next_id(),
            name: draft.name,
            is_member_order_locked: draft.is_member_order_locked,
            wait_module_completion: draft.wait_module_completion,
        };
        let mut members = Vec::with_capacity(draft.module_ids.len());
        for (index, module_id) in draft.module_ids.into_iter().enumerate() {
            members.push(GroupMember {
                id: t.next_id(),
                group_id: group.id,
                order_number: index as i32 + 1,
                module_id,
            });
        }
        t.groups.push(group.clone());
        t.members.extend(members.iter().cloned());
        Ok((group, members))
    }

    async fn group(&self, id: i64) -> StoreResult<Option<Group>> {
        let t = self.tables.lock().await;
        Ok(t.groups.iter().find(|g| g.id == id).cloned())
    }

    async fn group_members(&self, group_id: i64) -> StoreResult<Vec<GroupMember>> {
        let t = self.tables.lock().await;
        let mut members: Vec<_> = t
            .members
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.order_number);
        Ok(members)
    }

    async fn create_assignment(&self, draft: NewAssignment) -> StoreResult<Assignment> {
        let mut t = self.tables.lock().await;
        let assignment = Assignment {
            id: t.next_id(),
            title: draft.title,
            group_id: draft.group_id,
            start_date_utc: draft.start_date_utc,
            end_date_utc: draft.end_date_utc,
            show_results_immediately: draft.show_results_immediately,
            randomize_questions: draft.randomize_questions,
            randomize_answers: draft.randomize_answers,
            is_published: draft.is_published,
        };
        t.assignments.push(assignment.clone());
        Ok(assignment)
    }

    async fn assignment(&self, id: i64) -> StoreResult<Option<Assignment>> {
        let t = self.tables.lock().await;
        Ok(t.assignments.iter().find(|a| a.id == id).cloned())
    }

    async fn delete_assignment(&self, id: i64) -> StoreResult<bool> {
        let mut t = self.tables.lock().await;
        let before = t.assignments.len();
        t.assignments.retain(|a| a.id != id);
        if t.assignments.len() == before {
            return Ok(false);
        }

        let attempts: Vec<i64> = t
            .exam_taker_assignments
            .iter()
            .filter(|eta| eta.assignment_id == id)
            .map(|eta| eta.id)
            .collect();
        let progress: Vec<i64> = t
            .progress
            .iter()
            .filter(|p| attempts.contains(&p.exam_taker_assignment_id))
            .map(|p| p.id)
            .collect();

        t.responses
            .retain(|r| !progress.contains(&r.module_progress_id));
        t.progress.retain(|p| !progress.contains(&p.id));
        t.exam_taker_assignments
            .retain(|eta| eta.assignment_id != id);
        Ok(true)
    }

    async fn get_or_create_exam_taker_assignment(
        &self,
        assignment_id: i64,
        exam_taker_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<ExamTakerAssignment> {
        let mut t = self.tables.lock().await;
        if let Some(existing) = t
            .exam_taker_assignments
            .iter()
            .find(|eta| eta.assignment_id == assignment_id && eta.exam_taker_id == exam_taker_id)
        {
            return Ok(existing.clone());
        }
        let created = ExamTakerAssignment {
            id: t.next_id(),
            assignment_id,
            exam_taker_id,
            created_at_utc: now,
        };
        t.exam_taker_assignments.push(created.clone());
        Ok(created)
    }

    async fn find_exam_taker_assignment(
        &self,
        assignment_id: i64,
        exam_taker_id: i64,
    ) -> StoreResult<Option<ExamTakerAssignment>> {
        let t = self.tables.lock().await;
        Ok(t.exam_taker_assignments
            .iter()
            .find(|eta| eta.assignment_id == assignment_id && eta.exam_taker_id == exam_taker_id)
            .cloned())
    }

    async fn module_progress(
        &self,
        exam_taker_assignment_id: i64,
    ) -> StoreResult<Vec<ModuleProgress>> {
        let t = self.tables.lock().await;
        Ok(t.progress
            .iter()
            .filter(|p| p.exam_taker_assignment_id == exam_taker_assignment_id)
            .cloned()
            .collect())
    }

    async fn start_module(&self, draft: NewModuleProgress) -> StoreResult<ModuleProgress> {
        let mut t = self.tables.lock().await;
        if let Some(existing) = t.progress.iter_mut().find(|p| {
            p.exam_taker_assignment_id == draft.exam_taker_assignment_id
                && p.group_member_id == draft.group_member_id
        }) {
            crate::engine::timer::start(existing, draft.started_at_utc);
            return Ok(existing.clone());
        }

        let progress = ModuleProgress {
            id: t.next_id(),
            exam_taker_assignment_id: draft.exam_taker_assignment_id,
            group_member_id: draft.group_member_id,
            assessment_module_version_id: draft.assessment_module_version_id,
            has_started: true,
            started_at_utc: Some(draft.started_at_utc),
            completed_at_utc: None,
            duration_in_minutes: draft.duration_in_minutes,
            question_randomization_seed: draft.question_randomization_seed,
            answer_randomization_seed: draft.answer_randomization_seed,
        };
        t.progress.push(progress.clone());
        Ok(progress)
    }

    async fn complete_module(
        &self,
        progress_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<ModuleProgress> {
        let mut t = self.tables.lock().await;
        let progress = t
            .progress
            .iter_mut()
            .find(|p| p.id == progress_id)
            .ok_or(StoreError::NotFound("Module progress"))?;
        crate::engine::scoring::complete(progress, now);
        Ok(progress.clone())
    }

    async fn record_response(
        &self,
        progress_id: i64,
        writer: ResponseWriter,
    ) -> StoreResult<QuestionResponse> {
        let mut t = self.tables.lock().await;
        let progress = t
            .progress
            .iter()
            .find(|p| p.id == progress_id)
            .ok_or(StoreError::NotFound("Module progress"))?;
        let draft = writer(progress)?;

        if let Some(existing) = t.responses.iter_mut().find(|r| {
            r.module_progress_id == draft.module_progress_id && r.question_id == draft.question_id
        }) {
            existing.question_type = draft.question_type;
            existing.selected_answer_ids = draft.selected_answer_ids;
            existing.text_response = draft.text_response;
            existing.is_correct = draft.is_correct;
            existing.responded_at_utc = draft.responded_at_utc;
            return Ok(existing.clone());
        }

        let response = QuestionResponse {
            id: t.next_id(),
            module_progress_id: draft.module_progress_id,
            question_id: draft.question_id,
            question_type: draft.question_type,
            selected_answer_ids: draft.selected_answer_ids,
            text_response: draft.text_response,
            is_correct: draft.is_correct,
            responded_at_utc: draft.responded_at_utc,
        };
        t.responses.push(response.clone());
        Ok(response)
    }

    async fn responses(&self, progress_id: i64) -> StoreResult<Vec<QuestionResponse>> {
        let t = self.tables.lock().await;
        Ok(t.responses
            .iter()
            .filter(|r| r.module_progress_id == progress_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, fixtures::t0};
    use crate::models::module_version::QuestionType;
    use crate::models::progress::NewQuestionResponse;
    use chrono::Duration;
    use std::sync::Arc;

    fn draft(started_at_utc: DateTime<Utc>) -> NewModuleProgress {
        NewModuleProgress {
            exam_taker_assignment_id: 1,
            group_member_id: 2,
            assessment_module_version_id: 3,
            started_at_utc,
            duration_in_minutes: 30,
            question_randomization_seed: Some(11),
            answer_randomization_seed: None,
        }
    }

    fn answer(progress: &ModuleProgress, is_correct: bool) -> NewQuestionResponse {
        NewQuestionResponse {
            module_progress_id: progress.id,
            question_id: 5,
            question_type: QuestionType::SingleChoice,
            selected_answer_ids: vec![if is_correct { 2 } else { 1 }],
            text_response: None,
            is_correct,
            responded_at_utc: t0(),
        }
    }

    #[tokio::test]
    async fn concurrent_starts_create_one_record() {
        let store = Arc::new(MemoryAttemptStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .start_module(draft(t0() + Duration::seconds(i)))
                        .await
                })
            })
            .collect();

        let mut started = Vec::new();
        for handle in handles {
            started.push(handle.await.unwrap().unwrap());
        }

        let all = store.module_progress(1).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(started.iter().all(|p| p == &all[0]));
    }

    #[tokio::test]
    async fn restart_keeps_original_start_and_pin() {
        let store = MemoryAttemptStore::new();
        let first = store.start_module(draft(t0())).await.unwrap();

        let mut later = draft(t0() + Duration::minutes(20));
        later.assessment_module_version_id = 99;
        let second = store.start_module(later).await.unwrap();

        assert_eq!(second, first);
        assert_eq!(second.started_at_utc, Some(t0()));
        assert_eq!(second.assessment_module_version_id, 3);
    }

    #[tokio::test]
    async fn responses_are_upserted_per_question() {
        let store = MemoryAttemptStore::new();
        let progress = store.start_module(draft(t0())).await.unwrap();

        let p = progress.clone();
        store
            .record_response(progress.id, Box::new(move |_| Ok(answer(&p, true))))
            .await
            .unwrap();
        let p = progress.clone();
        let second = store
            .record_response(progress.id, Box::new(move |_| Ok(answer(&p, false))))
            .await
            .unwrap();

        let all = store.responses(progress.id).await.unwrap();
        assert_eq!(all, vec![second]);
        assert!(!all[0].is_correct);
    }

    #[tokio::test]
    async fn writer_sees_completion() {
        let store = MemoryAttemptStore::new();
        let progress = store.start_module(draft(t0())).await.unwrap();
        store.complete_module(progress.id, t0()).await.unwrap();

        let result = store
            .record_response(
                progress.id,
                Box::new(|locked| {
                    if locked.completed_at_utc.is_some() {
                        Err(EngineError::ImmutableState)
                    } else {
                        Ok(answer(locked, true))
                    }
                }),
            )
            .await;

        assert!(matches!(
            result,
            Err(StoreError::Rejected(EngineError::ImmutableState))
        ));
        assert!(store.responses(progress.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_assignment_cascades() {
        let store = MemoryAttemptStore::new();
        let (group, _) = store
            .create_group(NewGroup {
                name: "g".to_string(),
                is_member_order_locked: false,
                wait_module_completion: false,
                module_ids: vec![1],
            })
            .await
            .unwrap();
        let assignment = store
            .create_assignment(NewAssignment {
                title: "a".to_string(),
                group_id: group.id,
                start_date_utc: t0(),
                end_date_utc: t0() + Duration::days(1),
                show_results_immediately: true,
                randomize_questions: false,
                randomize_answers: false,
                is_published: true,
            })
            .await
            .unwrap();
        let eta = store
            .get_or_create_exam_taker_assignment(assignment.id, 7, t0())
            .await
            .unwrap();
        let mut d = draft(t0());
        d.exam_taker_assignment_id = eta.id;
        let progress = store.start_module(d).await.unwrap();

        assert!(store.delete_assignment(assignment.id).await.unwrap());
        assert!(store.module_progress(eta.id).await.unwrap().is_empty());
        assert!(store.responses(progress.id).await.unwrap().is_empty());
        assert!(
            store
                .find_exam_taker_assignment(assignment.id, 7)
                .await
                .unwrap()
                .is_none()
        );
        assert!(!store.delete_assignment(assignment.id).await.unwrap());
    }
}
