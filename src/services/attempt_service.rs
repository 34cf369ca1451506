// src/services/attempt_service.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    engine::{
        EngineError,
        clock::Clock,
        ordering, recorder, scoring,
        seed::{self, AttemptSeeds, SeedGenerator},
        status::{self, ModuleStatus, StatusContext},
        timer,
    },
    error::AppError,
    models::{
        assignment::{Assignment, ExamTakerAssignment},
        group::{Group, GroupMember},
        module_version::{AssessmentModuleVersion, ExamTakerQuestion},
        progress::{
            AdminModuleReport, AdminProgressReport, CompletionResponse, ModuleProgress,
            ModuleStateResponse, ModuleSummary, NewModuleProgress, ResponseView,
            SubmitResponseRequest,
        },
    },
    store::{AttemptStore, ResponseWriter},
};

/// Everything loaded for one exam taker's attempt at one assignment.
#[derive(Debug, Clone)]
struct AttemptContext {
    assignment: Assignment,
    group: Group,
    members: Vec<GroupMember>,
    exam_taker_assignment: ExamTakerAssignment,
    progress: Vec<ModuleProgress>,
}

impl AttemptContext {
    fn member(&self, group_member_id: i64) -> Result<&GroupMember, AppError> {
        self.members
            .iter()
            .find(|m| m.id == group_member_id)
            .ok_or_else(|| AppError::NotFound("Module not found in this assignment".to_string()))
    }

    fn progress_of(&self, group_member_id: i64) -> Option<&ModuleProgress> {
        self.progress
            .iter()
            .find(|p| p.group_member_id == group_member_id)
    }

    fn status_context<'a>(&'a self, member: &'a GroupMember, now: DateTime<Utc>) -> StatusContext<'a> {
        StatusContext {
            assignment: &self.assignment,
            group: &self.group,
            members: &self.members,
            member,
            progress: &self.progress,
            now,
        }
    }

    fn status_of(&self, member: &GroupMember, now: DateTime<Utc>) -> ModuleStatus {
        status::resolve(&self.status_context(member, now))
    }

    /// Status with `fresh` standing in for whatever was loaded for that record.
    fn status_with(&self, member: &GroupMember, fresh: &ModuleProgress, now: DateTime<Utc>) -> ModuleStatus {
        let mut progress: Vec<ModuleProgress> = self
            .progress
            .iter()
            .filter(|p| p.id != fresh.id)
            .cloned()
            .collect();
        progress.push(fresh.clone());
        status::resolve(&StatusContext {
            progress: &progress,
            ..self.status_context(member, now)
        })
    }
}

/// Outcome of completing a module, before the results gate is applied.
#[derive(Debug, Clone)]
pub struct ModuleCompletion {
    pub response: CompletionResponse,
    pub show_results_immediately: bool,
}

/// Request-level flows for exam takers plus the administrator report.
///
/// Status is recomputed from the store on every call; nothing is cached
/// between requests.
pub struct AttemptService {
    store: Arc<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
    seeds: Arc<SeedGenerator>,
}

impl AttemptService {
    pub fn new(store: Arc<dyn AttemptStore>, clock: Arc<dyn Clock>, seeds: Arc<SeedGenerator>) -> Self {
        Self {
            store,
            clock,
            seeds,
        }
    }

    async fn load_group(&self, assignment: &Assignment) -> Result<(Group, Vec<GroupMember>), AppError> {
        let group = self
            .store
            .group(assignment.group_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Group not found".to_string()))?;
        let members = self.store.group_members(group.id).await?;
        Ok((group, members))
    }

    /// Loads the attempt, creating the exam taker's assignment record on first access.
    async fn load_context(&self, assignment_id: i64, exam_taker_id: i64) -> Result<AttemptContext, AppError> {
        let assignment = self
            .store
            .assignment(assignment_id)
            .await?
            .filter(|a| a.is_published)
            .ok_or_else(|| AppError::NotFound("Assignment not found".to_string()))?;
        let (group, members) = self.load_group(&assignment).await?;

        let exam_taker_assignment = self
            .store
            .get_or_create_exam_taker_assignment(assignment.id, exam_taker_id, self.clock.now())
            .await?;
        let progress = self.store.module_progress(exam_taker_assignment.id).await?;

        Ok(AttemptContext {
            assignment,
            group,
            members,
            exam_taker_assignment,
            progress,
        })
    }

    async fn pinned_version(&self, progress: &ModuleProgress) -> Result<AssessmentModuleVersion, AppError> {
        self.store
            .module_version(progress.assessment_module_version_id)
            .await?
            .ok_or_else(|| {
                AppError::InternalServerError(format!(
                    "Pinned module version {} is missing",
                    progress.assessment_module_version_id
                ))
            })
    }

    pub async fn list_modules(&self, assignment_id: i64, exam_taker_id: i64) -> Result<Vec<ModuleSummary>, AppError> {
        let ctx = self.load_context(assignment_id, exam_taker_id).await?;
        let now = self.clock.now();

        Ok(ctx
            .members
            .iter()
            .map(|m| ModuleSummary {
                group_member_id: m.id,
                order_number: m.order_number,
                module_id: m.module_id,
                status: ctx.status_of(m, now),
                is_accessible: ordering::can_access(&ctx.status_context(m, now)),
                time_remaining_seconds: ctx
                    .progress_of(m.id)
                    .and_then(|p| timer::remaining_time(p, now))
                    .map(|d| d.num_seconds()),
            })
            .collect())
    }

    pub async fn module_state(
        &self,
        assignment_id: i64,
        group_member_id: i64,
        exam_taker_id: i64,
    ) -> Result<ModuleStateResponse, AppError> {
        let ctx = self.load_context(assignment_id, exam_taker_id).await?;
        self.render_state(&ctx, group_member_id).await
    }

    async fn render_state(&self, ctx: &AttemptContext, group_member_id: i64) -> Result<ModuleStateResponse, AppError> {
        let now = self.clock.now();
        let member = ctx.member(group_member_id)?;
        let status = ordering::ensure_accessible(&ctx.status_context(member, now))?;
        let progress = ctx.progress_of(member.id);

        // Questions stay hidden until the clock is running.
        let (questions, current_responses) = match progress {
            Some(p) => {
                let version = self.pinned_version(p).await?;
                let seeds = AttemptSeeds {
                    question: p.question_randomization_seed,
                    answer: p.answer_randomization_seed,
                };
                let questions = seed::arrange(&version.questions, seeds)
                    .iter()
                    .map(ExamTakerQuestion::from)
                    .collect();
                let responses = self
                    .store
                    .responses(p.id)
                    .await?
                    .iter()
                    .map(ResponseView::from)
                    .collect();
                (questions, responses)
            }
            None => (Vec::new(), Vec::new()),
        };

        Ok(ModuleStateResponse {
            assignment_id: ctx.assignment.id,
            group_member_id: member.id,
            order_number: member.order_number,
            module_id: member.module_id,
            status,
            started_at_utc: progress.and_then(|p| p.started_at_utc),
            completed_at_utc: progress.and_then(|p| p.completed_at_utc),
            duration_in_minutes: progress.map(|p| p.duration_in_minutes),
            time_remaining_seconds: progress
                .and_then(|p| timer::remaining_time(p, now))
                .map(|d| d.num_seconds()),
            elapsed_seconds: progress
                .and_then(|p| timer::elapsed_time(p, now))
                .map(|d| d.num_seconds()),
            questions,
            current_responses,
        })
    }

    /// Starts the module, pinning the latest published version.
    ///
    /// Idempotent: a module that is already running, finished or expired is
    /// returned as it is.
    pub async fn start_module(
        &self,
        assignment_id: i64,
        group_member_id: i64,
        exam_taker_id: i64,
    ) -> Result<ModuleStateResponse, AppError> {
        let mut ctx = self.load_context(assignment_id, exam_taker_id).await?;
        let now = self.clock.now();
        let member = ctx.member(group_member_id)?.clone();
        let status = ordering::ensure_accessible(&ctx.status_context(&member, now))?;

        match status {
            ModuleStatus::NotStarted => {
                if now >= ctx.assignment.end_date_utc {
                    return Err(EngineError::AssignmentClosed.into());
                }
                let version = self
                    .store
                    .latest_module_version(member.module_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(format!(
                            "Module {} has no published version",
                            member.module_id
                        ))
                    })?;
                let seeds = self.seeds.generate(
                    ctx.assignment.randomize_questions,
                    ctx.assignment.randomize_answers,
                );

                let progress = self
                    .store
                    .start_module(NewModuleProgress {
                        exam_taker_assignment_id: ctx.exam_taker_assignment.id,
                        group_member_id: member.id,
                        assessment_module_version_id: version.id,
                        started_at_utc: now,
                        duration_in_minutes: version.duration_in_minutes,
                        question_randomization_seed: seeds.question,
                        answer_randomization_seed: seeds.answer,
                    })
                    .await?;

                tracing::info!(
                    "Module started: attempt={}, member={}, version={}, started_at={:?}",
                    ctx.exam_taker_assignment.id,
                    member.id,
                    progress.assessment_module_version_id,
                    progress.started_at_utc
                );

                ctx.progress.retain(|p| p.id != progress.id);
                ctx.progress.push(progress);
            }
            ModuleStatus::WaitForModuleDurationToElapse => {
                return Err(EngineError::NotAccessible(status).into());
            }
            _ => {
                tracing::debug!(
                    "Start ignored for member {}: module is {}",
                    member.id,
                    status
                );
            }
        }

        self.render_state(&ctx, group_member_id).await
    }

    /// Grades and upserts one answer. The status is re-resolved under the
    /// progress row lock, so a concurrent completion always wins.
    pub async fn submit_response(
        &self,
        assignment_id: i64,
        group_member_id: i64,
        exam_taker_id: i64,
        req: SubmitResponseRequest,
    ) -> Result<ResponseView, AppError> {
        let ctx = self.load_context(assignment_id, exam_taker_id).await?;
        let member = ctx.member(group_member_id)?.clone();

        let Some(progress) = ctx.progress_of(member.id).cloned() else {
            recorder::check_status(ctx.status_of(&member, self.clock.now()))?;
            return Err(EngineError::NotStarted.into());
        };
        let version = self.pinned_version(&progress).await?;

        let clock = self.clock.clone();
        let question_id = req.question_id;
        let writer: ResponseWriter = Box::new(move |locked: &ModuleProgress| {
            let now = clock.now();
            let status = ctx.status_with(&member, locked, now);
            recorder::record(
                status,
                locked,
                &version,
                req.question_id,
                req.selected_answer_ids.as_deref(),
                req.text_response.as_deref(),
                now,
            )
        });

        let response = self
            .store
            .record_response(progress.id, writer)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    "Response rejected: progress={}, question={}: {}",
                    progress.id,
                    question_id,
                    e
                )
            })?;

        tracing::info!(
            "Response recorded: progress={}, question={}, correct={}",
            progress.id,
            question_id,
            response.is_correct
        );

        Ok(ResponseView::from(&response))
    }

    /// Completes the module once and scores it from the stored responses.
    pub async fn complete_module(
        &self,
        assignment_id: i64,
        group_member_id: i64,
        exam_taker_id: i64,
    ) -> Result<ModuleCompletion, AppError> {
        let ctx = self.load_context(assignment_id, exam_taker_id).await?;
        let now = self.clock.now();
        let member = ctx.member(group_member_id)?;
        ordering::ensure_accessible(&ctx.status_context(member, now))?;

        let progress = ctx
            .progress_of(member.id)
            .ok_or(AppError::Engine(EngineError::NotStarted))?;
        let completed = self.store.complete_module(progress.id, now).await?;
        if progress.completed_at_utc.is_none() {
            tracing::info!(
                "Module completed: progress={}, completed_at={:?}",
                completed.id,
                completed.completed_at_utc
            );
        }

        let version = self.pinned_version(&completed).await?;
        let responses = self.store.responses(completed.id).await?;
        let score = scoring::score(&version, &responses);

        Ok(ModuleCompletion {
            response: CompletionResponse {
                group_member_id: member.id,
                completed_at_utc: completed.completed_at_utc,
                score: Some(score),
                results_withheld: false,
            },
            show_results_immediately: ctx.assignment.show_results_immediately,
        })
    }

    /// Administrator view of one exam taker's attempt. Never creates records.
    pub async fn progress_report(&self, assignment_id: i64, exam_taker_id: i64) -> Result<AdminProgressReport, AppError> {
        let assignment = self
            .store
            .assignment(assignment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Assignment not found".to_string()))?;
        let (group, members) = self.load_group(&assignment).await?;
        let exam_taker_assignment = self
            .store
            .find_exam_taker_assignment(assignment.id, exam_taker_id)
            .await?;
        let progress = match &exam_taker_assignment {
            Some(eta) => self.store.module_progress(eta.id).await?,
            None => Vec::new(),
        };
        let now = self.clock.now();

        let mut modules = Vec::with_capacity(members.len());
        for member in &members {
            let status = status::resolve(&StatusContext {
                assignment: &assignment,
                group: &group,
                members: &members,
                member,
                progress: &progress,
                now,
            });
            let own = progress.iter().find(|p| p.group_member_id == member.id);

            let (questions, responses, score) = match own {
                Some(p) => {
                    let version = self.pinned_version(p).await?;
                    let responses = self.store.responses(p.id).await?;
                    let score = scoring::score(&version, &responses);
                    (version.questions.0, responses, Some(score))
                }
                None => (Vec::new(), Vec::new(), None),
            };

            modules.push(AdminModuleReport {
                group_member_id: member.id,
                order_number: member.order_number,
                module_id: member.module_id,
                status,
                progress: own.cloned(),
                score,
                questions,
                responses,
            });
        }

        Ok(AdminProgressReport {
            assignment_id: assignment.id,
            exam_taker_id,
            exam_taker_assignment_id: exam_taker_assignment.map(|eta| eta.id),
            modules,
        })
    }
}
