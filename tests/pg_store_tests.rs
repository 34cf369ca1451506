// tests/pg_store_tests.rs

//! Store tests against a real Postgres. They run when `DATABASE_URL` is set
//! and return early otherwise.

use std::{
    sync::atomic::{AtomicI64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use assessment_backend::{
    engine::{EngineError, recorder, status::ModuleStatus},
    models::{
        assignment::{ExamTakerAssignment, NewAssignment},
        group::{GroupMember, NewGroup},
        module_version::{AnswerOption, AssessmentModuleVersion, NewModuleVersion, Question, QuestionType},
        progress::{ModuleProgress, NewModuleProgress},
    },
    store::{AttemptStore, PgAttemptStore, ResponseWriter, StoreError},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::postgres::PgPoolOptions;

async fn connect() -> Option<PgAttemptStore> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres store tests");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    Some(PgAttemptStore::new(pool))
}

/// Module ids are caller-chosen, so each test run picks fresh ones.
fn unique_module_id() -> i64 {
    static NEXT: AtomicI64 = AtomicI64::new(0);
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_micros() as i64;
    micros * 100 + NEXT.fetch_add(1, Ordering::Relaxed) % 100
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
}

fn draft_version(module_id: i64) -> NewModuleVersion {
    NewModuleVersion {
        module_id,
        title: "Lockout procedures".to_string(),
        passing_score_percentage: 50,
        duration_in_minutes: 30,
        questions: vec![Question {
            id: 1,
            question_type: QuestionType::SingleChoice,
            text: "Which one is correct?".to_string(),
            answers: vec![
                AnswerOption {
                    id: 1,
                    text: "A1".to_string(),
                    is_correct: false,
                },
                AnswerOption {
                    id: 2,
                    text: "A2".to_string(),
                    is_correct: true,
                },
            ],
        }],
        published_at: t0(),
    }
}

struct Fixture {
    assignment_id: i64,
    version: AssessmentModuleVersion,
    member: GroupMember,
    attempt: ExamTakerAssignment,
}

async fn fixture(store: &PgAttemptStore) -> Fixture {
    let module_id = unique_module_id();
    let version = store
        .publish_module_version(draft_version(module_id))
        .await
        .unwrap();
    let (group, members) = store
        .create_group(NewGroup {
            name: "Plant safety".to_string(),
            is_member_order_locked: true,
            wait_module_completion: false,
            module_ids: vec![module_id],
        })
        .await
        .unwrap();
    let assignment = store
        .create_assignment(NewAssignment {
            title: "Quarterly check".to_string(),
            group_id: group.id,
            start_date_utc: t0() - Duration::days(1),
            end_date_utc: t0() + Duration::days(7),
            show_results_immediately: true,
            randomize_questions: false,
            randomize_answers: false,
            is_published: true,
        })
        .await
        .unwrap();
    let attempt = store
        .get_or_create_exam_taker_assignment(assignment.id, 7, t0())
        .await
        .unwrap();

    Fixture {
        assignment_id: assignment.id,
        version,
        member: members[0].clone(),
        attempt,
    }
}

fn start_draft(fx: &Fixture, at: DateTime<Utc>, seed: i64) -> NewModuleProgress {
    NewModuleProgress {
        exam_taker_assignment_id: fx.attempt.id,
        group_member_id: fx.member.id,
        assessment_module_version_id: fx.version.id,
        started_at_utc: at,
        duration_in_minutes: fx.version.duration_in_minutes,
        question_randomization_seed: Some(seed),
        answer_randomization_seed: Some(seed),
    }
}

fn answer_writer(version: AssessmentModuleVersion, answer_id: i64) -> ResponseWriter {
    Box::new(move |progress: &ModuleProgress| {
        recorder::record(
            ModuleStatus::InProgress,
            progress,
            &version,
            1,
            Some(&[answer_id]),
            None,
            t0() + Duration::minutes(1),
        )
    })
}

#[tokio::test]
async fn concurrent_starts_share_one_row() {
    let Some(store) = connect().await else {
        return;
    };
    let fx = fixture(&store).await;

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            let draft = start_draft(&fx, t0() + Duration::seconds(i), i);
            tokio::spawn(async move { store.start_module(draft).await.unwrap() })
        })
        .collect();

    let mut started = Vec::new();
    for handle in handles {
        started.push(handle.await.unwrap());
    }

    let rows = store.module_progress(fx.attempt.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(started.iter().all(|p| *p == rows[0]));

    // A later start keeps the first start time, pin and seeds.
    let mut later = start_draft(&fx, t0() + Duration::minutes(5), 99);
    later.duration_in_minutes = 90;
    let again = store.start_module(later).await.unwrap();
    assert_eq!(again, rows[0]);
}

#[tokio::test]
async fn concurrent_lookups_share_one_attempt() {
    let Some(store) = connect().await else {
        return;
    };
    let fx = fixture(&store).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let assignment_id = fx.assignment_id;
            tokio::spawn(async move {
                store
                    .get_or_create_exam_taker_assignment(assignment_id, 8, t0())
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().id);
    }
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn writes_after_completion_are_rejected() {
    let Some(store) = connect().await else {
        return;
    };
    let fx = fixture(&store).await;
    let progress = store.start_module(start_draft(&fx, t0(), 1)).await.unwrap();

    let first = store
        .record_response(progress.id, answer_writer(fx.version.clone(), 2))
        .await
        .unwrap();
    assert!(first.is_correct);

    let done_at = t0() + Duration::minutes(10);
    let completed = store.complete_module(progress.id, done_at).await.unwrap();
    assert_eq!(completed.completed_at_utc, Some(done_at));

    // Completing again keeps the original time.
    let again = store
        .complete_module(progress.id, done_at + Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(again.completed_at_utc, Some(done_at));

    let result = store
        .record_response(progress.id, answer_writer(fx.version.clone(), 1))
        .await;
    assert!(matches!(
        result,
        Err(StoreError::Rejected(EngineError::ImmutableState))
    ));

    let stored = store.responses(progress.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].selected_answer_ids, vec![2]);
}

#[tokio::test]
async fn deleting_assignment_cascades() {
    let Some(store) = connect().await else {
        return;
    };
    let fx = fixture(&store).await;
    let progress = store.start_module(start_draft(&fx, t0(), 1)).await.unwrap();
    store
        .record_response(progress.id, answer_writer(fx.version.clone(), 2))
        .await
        .unwrap();

    assert!(store.delete_assignment(fx.assignment_id).await.unwrap());

    assert!(
        store
            .find_exam_taker_assignment(fx.assignment_id, 7)
            .await
            .unwrap()
            .is_none()
    );
    assert!(store.module_progress(fx.attempt.id).await.unwrap().is_empty());
    assert!(store.responses(progress.id).await.unwrap().is_empty());
    assert!(!store.delete_assignment(fx.assignment_id).await.unwrap());

    // Authored content outlives the assignment.
    assert!(store.module_version(fx.version.id).await.unwrap().is_some());
}

#[tokio::test]
async fn concurrent_publishes_get_distinct_numbers() {
    let Some(store) = connect().await else {
        return;
    };
    let module_id = unique_module_id();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.publish_module_version(draft_version(module_id)).await })
        })
        .collect();

    let mut numbers = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(version) => numbers.push(version.version_number),
            Err(StoreError::Conflict(_)) => {}
            Err(e) => panic!("unexpected publish error: {}", e),
        }
    }

    assert!(!numbers.is_empty());
    let mut distinct = numbers.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), numbers.len());
}
