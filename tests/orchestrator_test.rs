mod common;

use assessment_engine::database::memory::MemoryJobStatus;
use assessment_engine::database::ScoringQueue;
use assessment_engine::dto::attempt_dto::SubmitAttemptRequest;
use assessment_engine::dto::scoring_dto::{OperationPointResult, ScoringCallback};
use assessment_engine::error::Error;
use assessment_engine::models::attempt::AttemptStatus;
use assessment_engine::services::question_bank::QuestionBankIndex;
use assessment_engine::services::queue_service::retry_delay;
use assessment_engine::utils::time::Clock;
use chrono::Duration;
use assessment_engine::models::extraction::ExtractionRuleSet;
use common::{
    dec, exam_definition, mock_definition, mock_rules, pool_modules, pool_training, setup,
    setup_with_scorer, t0, MockScorer,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

fn pool() -> QuestionBankIndex {
    QuestionBankIndex::new(&pool_modules()).expect("pool")
}

fn submit(attempt_id: Uuid) -> SubmitAttemptRequest {
    SubmitAttemptRequest {
        attempt_id,
        artifact_ref: format!("workspace/{}", attempt_id),
    }
}

#[tokio::test]
async fn start_extracts_and_starts_mock_exam() {
    let env = setup();
    let definition = mock_definition(true);

    let started = assert_ok!(
        env.state
            .orchestrator
            .start_attempt(Uuid::new_v4(), &definition, &pool())
            .await
    );
    assert!(!started.resumed);
    assert_eq!(started.attempt.status, AttemptStatus::InProgress);
    assert_eq!(started.question_set.questions.len(), 9);
    assert_eq!(started.question_set.total_score(), dec(100));

    let stored = env
        .state
        .attempt_service
        .question_set(started.attempt.id)
        .await
        .unwrap();
    assert_eq!(stored, Some(started.question_set));
}

#[tokio::test]
async fn resume_returns_same_paper() {
    let env = setup();
    let definition = mock_definition(true);
    let student = Uuid::new_v4();
    let orchestrator = &env.state.orchestrator;

    let first = orchestrator.start_attempt(student, &definition, &pool()).await.unwrap();
    env.clock.advance(Duration::minutes(5));
    let again = orchestrator.start_attempt(student, &definition, &pool()).await.unwrap();

    assert!(again.resumed);
    assert_eq!(again.attempt.id, first.attempt.id);
    assert_eq!(again.question_set, first.question_set);
    assert_eq!(again.attempt.started_at, first.attempt.started_at);
}

#[tokio::test]
async fn created_attempt_is_started_on_resume() {
    let env = setup();
    let definition = exam_definition(&[60, 40]);
    let student = Uuid::new_v4();

    // Attempt persisted with its paper, then the process died before Start.
    let planned = env
        .state
        .attempt_service
        .plan_attempt(student, &definition)
        .await
        .unwrap();
    let bank = QuestionBankIndex::from_definition(&definition).unwrap();
    let paper = assessment_engine::services::extraction_service::ExtractionEngine::materialize_fixed(
        &bank, false, 1,
    );
    let created = env
        .state
        .attempt_service
        .insert_planned(planned, Some(&paper))
        .await
        .unwrap();

    let resumed = env
        .state
        .orchestrator
        .start_attempt(student, &definition, &QuestionBankIndex::default())
        .await
        .unwrap();
    assert!(resumed.resumed);
    assert_eq!(resumed.attempt.id, created.id);
    assert_eq!(resumed.attempt.status, AttemptStatus::InProgress);
    assert_eq!(resumed.question_set, paper);
}

#[tokio::test]
async fn retake_draws_a_fresh_attempt() {
    let env = setup();
    let definition = mock_definition(true);
    let student = Uuid::new_v4();
    let orchestrator = &env.state.orchestrator;

    let first = orchestrator.start_attempt(student, &definition, &pool()).await.unwrap();
    orchestrator.abandon_attempt(first.attempt.id).await.unwrap();

    let second = orchestrator.start_attempt(student, &definition, &pool()).await.unwrap();
    assert!(!second.resumed);
    assert_ne!(second.attempt.id, first.attempt.id);
    assert_eq!(second.attempt.attempt_number, 2);
    assert_ne!(second.question_set.seed, first.question_set.seed);
}

#[tokio::test]
async fn too_small_pool_leaves_no_attempt_behind() {
    let env = setup();
    let definition = mock_definition(true);
    let student = Uuid::new_v4();
    let small = QuestionBankIndex::new(&pool_modules()[..1]).unwrap();

    let err = assert_err!(
        env.state
            .orchestrator
            .start_attempt(student, &definition, &small)
            .await
    );
    assert_eq!(err.code(), "insufficient_pool");
    assert!(env
        .state
        .attempt_service
        .list_attempts(student, definition.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn submit_completes_and_enqueues_scoring() {
    let env = setup();
    let definition = exam_definition(&[40, 30, 30]);
    let started = env
        .state
        .orchestrator
        .start_attempt(Uuid::new_v4(), &definition, &QuestionBankIndex::default())
        .await
        .unwrap();

    env.clock.advance(Duration::minutes(12));
    let submitted = assert_ok!(env.state.orchestrator.submit_attempt(&submit(started.attempt.id)).await);
    assert_eq!(submitted.attempt.status, AttemptStatus::Completed);
    assert_eq!(submitted.attempt.duration_seconds, Some(12 * 60));
    assert_eq!(env.queue.pending_for(started.attempt.id), 1);
    assert_eq!(
        env.queue.status_of(submitted.scoring_job_id),
        Some(MemoryJobStatus::Pending)
    );

    let status = env.state.orchestrator.status(started.attempt.id).await.unwrap();
    assert_eq!(status.status, AttemptStatus::Completed);
    assert!(status.time_remaining_seconds.is_none());
}

#[tokio::test]
async fn submit_of_abandoned_attempt_is_rejected() {
    let env = setup();
    let definition = exam_definition(&[100]);
    let started = env
        .state
        .orchestrator
        .start_attempt(Uuid::new_v4(), &definition, &QuestionBankIndex::default())
        .await
        .unwrap();
    env.state.orchestrator.abandon_attempt(started.attempt.id).await.unwrap();

    let err = assert_err!(env.state.orchestrator.submit_attempt(&submit(started.attempt.id)).await);
    assert!(matches!(
        err,
        Error::InvalidTransition {
            from: AttemptStatus::Abandoned,
            to: AttemptStatus::Completed
        }
    ));
    assert_eq!(env.queue.pending_for(started.attempt.id), 0);
}

#[tokio::test]
async fn expired_attempt_can_still_be_submitted_for_scoring() {
    let env = setup();
    let definition = exam_definition(&[100]);
    let started = env
        .state
        .orchestrator
        .start_attempt(Uuid::new_v4(), &definition, &QuestionBankIndex::default())
        .await
        .unwrap();
    env.clock.advance(Duration::minutes(90));
    env.state.attempt_service.expire_overdue().await.unwrap();

    let submitted = assert_ok!(env.state.orchestrator.submit_attempt(&submit(started.attempt.id)).await);
    assert_eq!(submitted.attempt.status, AttemptStatus::Expired);
    assert_eq!(env.queue.pending_for(started.attempt.id), 1);
}

#[tokio::test]
async fn status_reports_time_remaining() {
    let env = setup();
    let definition = exam_definition(&[100]);
    let started = env
        .state
        .orchestrator
        .start_attempt(Uuid::new_v4(), &definition, &QuestionBankIndex::default())
        .await
        .unwrap();

    env.clock.advance(Duration::minutes(15));
    let status = env.state.orchestrator.status(started.attempt.id).await.unwrap();
    assert_eq!(status.time_remaining_seconds, Some(45 * 60));
    assert_eq!(status.expires_at, Some(t0() + Duration::minutes(60)));
}

#[tokio::test]
async fn worker_merges_inline_scorer_result() {
    let mut scorer = MockScorer::new();
    scorer.expect_request_scoring().times(1).returning(|request| {
        Ok(Some(ScoringCallback {
            attempt_id: request.attempt_id,
            results: vec![OperationPointResult {
                operation_point_id: 101,
                earned: dec(80),
                max: dec(100),
                passed: true,
                detail: Some("cell fill ok".to_string()),
            }],
            completed_fully: true,
        }))
    });
    let env = setup_with_scorer(scorer);
    let definition = exam_definition(&[100]);
    let started = env
        .state
        .orchestrator
        .start_attempt(Uuid::new_v4(), &definition, &QuestionBankIndex::default())
        .await
        .unwrap();
    let submitted = env
        .state
        .orchestrator
        .submit_attempt(&submit(started.attempt.id))
        .await
        .unwrap();

    assert!(env.state.scoring_worker.run_once().await.unwrap());
    assert_eq!(
        env.queue.status_of(submitted.scoring_job_id),
        Some(MemoryJobStatus::Dispatched)
    );
    assert!(!env.state.scoring_worker.run_once().await.unwrap());

    let attempt = env
        .state
        .attempt_service
        .get_attempt(started.attempt.id)
        .await
        .unwrap();
    assert_eq!(attempt.score, Some(dec(80)));
    assert!(attempt.score_finalized);
    assert_eq!(attempt.passed, Some(true));
}

#[tokio::test]
async fn worker_backs_off_then_gives_up() {
    let mut scorer = MockScorer::new();
    scorer
        .expect_request_scoring()
        .times(3)
        .returning(|_| Err(Error::Internal("scorer responded 503".to_string())));
    let env = setup_with_scorer(scorer);
    let definition = exam_definition(&[100]);
    let started = env
        .state
        .orchestrator
        .start_attempt(Uuid::new_v4(), &definition, &QuestionBankIndex::default())
        .await
        .unwrap();
    let job_id = env
        .state
        .orchestrator
        .submit_attempt(&submit(started.attempt.id))
        .await
        .unwrap()
        .scoring_job_id;
    let worker = &env.state.scoring_worker;

    assert!(worker.run_once().await.unwrap());
    assert_eq!(env.queue.status_of(job_id), Some(MemoryJobStatus::Pending));
    assert!(env.queue.last_error(job_id).unwrap().contains("503"));

    // Not due until the backoff elapses.
    assert!(!worker.run_once().await.unwrap());
    env.clock.advance(retry_delay(1));
    assert!(worker.run_once().await.unwrap());

    env.clock.advance(retry_delay(2));
    assert!(worker.run_once().await.unwrap());
    assert_eq!(env.queue.status_of(job_id), Some(MemoryJobStatus::Failed));

    env.clock.advance(Duration::hours(2));
    assert!(!worker.run_once().await.unwrap());
}

#[tokio::test]
async fn scorer_callback_is_recorded_through_orchestrator() {
    let env = setup();
    let definition = exam_definition(&[40, 30, 30]);
    let started = env
        .state
        .orchestrator
        .start_attempt(Uuid::new_v4(), &definition, &QuestionBankIndex::default())
        .await
        .unwrap();

    let score = env
        .state
        .orchestrator
        .record_scoring_result(&ScoringCallback {
            attempt_id: started.attempt.id,
            results: vec![OperationPointResult {
                operation_point_id: 201,
                earned: dec(30),
                max: dec(30),
                passed: true,
                detail: None,
            }],
            completed_fully: false,
        })
        .await
        .unwrap();
    assert_eq!(score.score, dec(30));
    assert_eq!(score.max_score, dec(100));
}

#[test]
fn retry_delay_doubles_and_caps() {
    assert_eq!(retry_delay(1), Duration::seconds(30));
    assert_eq!(retry_delay(2), Duration::seconds(60));
    assert_eq!(retry_delay(3), Duration::seconds(120));
    assert_eq!(retry_delay(20), Duration::seconds(3600));
}

#[tokio::test]
async fn queue_claims_oldest_due_job_first() {
    let env = setup();
    let definition = exam_definition(&[100]);
    let mut job_ids = Vec::new();
    for _ in 0..2 {
        let started = env
            .state
            .orchestrator
            .start_attempt(Uuid::new_v4(), &definition, &QuestionBankIndex::default())
            .await
            .unwrap();
        job_ids.push(
            env.state
                .orchestrator
                .submit_attempt(&submit(started.attempt.id))
                .await
                .unwrap()
                .scoring_job_id,
        );
    }

    let claimed = env.queue.claim_next(env.clock.now()).await.unwrap().unwrap();
    assert_eq!(claimed.id, job_ids[0]);
    assert_eq!(claimed.attempts, 1);
}

#[tokio::test]
async fn definition_randomize_flag_governs_mock_extraction() {
    let env = setup();
    let mut definition = mock_definition(false);
    // Rules stored without a flag of their own, plus a stale `true` on a copy.
    let mut stored = serde_json::to_value(mock_rules(true)).unwrap();
    stored.as_object_mut().unwrap().remove("randomize");
    let rules: ExtractionRuleSet = serde_json::from_value(stored).unwrap();
    assert!(!rules.randomize);
    definition.extraction_rules = Some(ExtractionRuleSet {
        randomize: true,
        ..rules
    });

    let orchestrator = &env.state.orchestrator;
    let a = orchestrator.start_attempt(Uuid::new_v4(), &definition, &pool()).await.unwrap();
    let b = orchestrator.start_attempt(Uuid::new_v4(), &definition, &pool()).await.unwrap();

    assert!(!a.question_set.randomized);
    assert_eq!(a.question_set.question_ids(), vec![1, 2, 3, 7, 8, 11, 12, 13, 14]);
    assert_eq!(a.question_set.question_ids(), b.question_set.question_ids());
}

#[tokio::test]
async fn overdue_attempt_is_expired_instead_of_resumed() {
    let env = setup();
    let definition = mock_definition(true);
    let student = Uuid::new_v4();
    let orchestrator = &env.state.orchestrator;

    let first = orchestrator.start_attempt(student, &definition, &pool()).await.unwrap();
    env.clock.advance(Duration::minutes(61));

    let second = orchestrator.start_attempt(student, &definition, &pool()).await.unwrap();
    assert!(!second.resumed);
    assert_ne!(second.attempt.id, first.attempt.id);
    assert_eq!(second.attempt.attempt_number, 2);
    assert_eq!(
        env.state.attempt_service.get_attempt(first.attempt.id).await.unwrap().status,
        AttemptStatus::Expired
    );
}

#[tokio::test]
async fn overdue_attempt_without_retakes_reports_limit() {
    let env = setup();
    let definition = exam_definition(&[100]);
    let student = Uuid::new_v4();
    let orchestrator = &env.state.orchestrator;

    let first = orchestrator
        .start_attempt(student, &definition, &QuestionBankIndex::default())
        .await
        .unwrap();
    env.clock.advance(Duration::minutes(90));

    let err = assert_err!(
        orchestrator
            .start_attempt(student, &definition, &QuestionBankIndex::default())
            .await
    );
    assert_eq!(err.code(), "retake_limit_exceeded");
    assert_eq!(
        env.state.attempt_service.get_attempt(first.attempt.id).await.unwrap().status,
        AttemptStatus::Expired
    );
}

#[tokio::test]
async fn start_assessment_loads_definition_and_pool() {
    let env = setup();
    env.definitions.insert(pool_training());
    let definition = mock_definition(true);
    env.definitions.insert(definition.clone());

    let started = assert_ok!(
        env.state
            .orchestrator
            .start_assessment(Uuid::new_v4(), definition.id)
            .await
    );
    assert_eq!(started.question_set.questions.len(), 9);
    assert_eq!(started.question_set.total_score(), dec(100));
    assert_eq!(started.attempt.assessment_id, definition.id);

    let missing = Uuid::new_v4();
    let err = assert_err!(env.state.orchestrator.start_assessment(Uuid::new_v4(), missing).await);
    assert!(matches!(err, Error::AssessmentNotFound(id) if id == missing));
}

#[tokio::test]
async fn start_assessment_ignores_disabled_trainings_in_pool() {
    let env = setup();
    let mut training = pool_training();
    training.enabled = false;
    env.definitions.insert(training);
    let definition = mock_definition(true);
    env.definitions.insert(definition.clone());

    let err = assert_err!(
        env.state
            .orchestrator
            .start_assessment(Uuid::new_v4(), definition.id)
            .await
    );
    assert_eq!(err.code(), "insufficient_pool");
}

#[tokio::test]
async fn failed_inline_merge_keeps_job_for_retry() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut scorer = MockScorer::new();
    {
        let calls = calls.clone();
        scorer.expect_request_scoring().times(2).returning(move |request| {
            // First answer is malformed and cannot be merged.
            let earned = if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                dec(-5)
            } else {
                dec(90)
            };
            Ok(Some(ScoringCallback {
                attempt_id: request.attempt_id,
                results: vec![OperationPointResult {
                    operation_point_id: 101,
                    earned,
                    max: dec(100),
                    passed: true,
                    detail: None,
                }],
                completed_fully: true,
            }))
        });
    }
    let env = setup_with_scorer(scorer);
    let definition = exam_definition(&[100]);
    let started = env
        .state
        .orchestrator
        .start_attempt(Uuid::new_v4(), &definition, &QuestionBankIndex::default())
        .await
        .unwrap();
    let job_id = env
        .state
        .orchestrator
        .submit_attempt(&submit(started.attempt.id))
        .await
        .unwrap()
        .scoring_job_id;
    let worker = &env.state.scoring_worker;

    assert!(worker.run_once().await.unwrap());
    assert_eq!(env.queue.status_of(job_id), Some(MemoryJobStatus::Pending));
    assert!(env.queue.last_error(job_id).unwrap().contains("Validation"));
    let attempt = env.state.attempt_service.get_attempt(started.attempt.id).await.unwrap();
    assert!(attempt.score.is_none());

    env.clock.advance(retry_delay(1));
    assert!(worker.run_once().await.unwrap());
    assert_eq!(env.queue.status_of(job_id), Some(MemoryJobStatus::Dispatched));
    let attempt = env.state.attempt_service.get_attempt(started.attempt.id).await.unwrap();
    assert_eq!(attempt.score, Some(dec(90)));
    assert!(attempt.score_finalized);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
