#![allow(dead_code)]

use assessment_engine::database::memory::{MemoryAttemptStore, MemoryDefinitions, MemoryScoringQueue};
use assessment_engine::dto::scoring_dto::{ScoringCallback, ScoringRequest};
use assessment_engine::error::Result;
use assessment_engine::models::assessment::{AssessmentDefinition, AssessmentKind};
use assessment_engine::models::extraction::{ExtractionRule, ExtractionRuleSet, Quota};
use assessment_engine::models::question::{Difficulty, Module, OperationPoint, Question, QuestionKind, Subject};
use assessment_engine::services::scorer_client::ScoringCollaborator;
use assessment_engine::utils::time::ManualClock;
use assessment_engine::AppState;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mockall::mock;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

mock! {
    pub Scorer {}

    #[async_trait]
    impl ScoringCollaborator for Scorer {
        async fn request_scoring(&self, request: &ScoringRequest) -> Result<Option<ScoringCallback>>;
    }
}

pub struct TestEnv {
    pub state: AppState,
    pub store: Arc<MemoryAttemptStore>,
    pub queue: Arc<MemoryScoringQueue>,
    pub definitions: Arc<MemoryDefinitions>,
    pub clock: ManualClock,
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0).unwrap()
}

pub fn dec(v: i64) -> Decimal {
    Decimal::from(v)
}

pub fn setup() -> TestEnv {
    setup_with_scorer(MockScorer::new())
}

pub fn setup_with_scorer(scorer: MockScorer) -> TestEnv {
    let store = Arc::new(MemoryAttemptStore::new());
    let queue = Arc::new(MemoryScoringQueue::new());
    let definitions = Arc::new(MemoryDefinitions::new());
    let clock = ManualClock::new(t0());
    let state = AppState::in_memory(
        store.clone(),
        queue.clone(),
        definitions.clone(),
        Arc::new(scorer),
        Arc::new(clock.clone()),
        3,
    );
    TestEnv {
        state,
        store,
        queue,
        definitions,
        clock,
    }
}

pub fn op(id: i64, score: i64) -> OperationPoint {
    OperationPoint {
        id,
        name: format!("op-{}", id),
        description: String::new(),
        score: dec(score),
        order: 0,
        parameters: Vec::new(),
    }
}

pub fn question(
    id: i64,
    kind: QuestionKind,
    difficulty: Difficulty,
    score: i64,
    operation_points: Vec<OperationPoint>,
) -> Question {
    Question {
        id,
        kind,
        title: format!("Question {}", id),
        content: String::new(),
        question_type: None,
        difficulty,
        estimated_minutes: 5,
        score: dec(score),
        weight: 1.0,
        sort_order: id as i32,
        enabled: true,
        operation_points,
    }
}

pub fn subject(id: i64, questions: Vec<Question>) -> Subject {
    Subject {
        id,
        name: format!("Subject {}", id),
        subject_type: None,
        score: questions.iter().map(|q| q.score).sum(),
        sort_order: id as i32,
        questions,
    }
}

pub fn module(id: i64, kind: QuestionKind, subjects: Vec<Subject>) -> Module {
    Module {
        id,
        name: format!("Module {}", id),
        kind,
        score: subjects.iter().map(|s| s.score).sum(),
        sort_order: id as i32,
        subjects,
    }
}

/// Mock exam pool:
/// module 1 (Excel): subject 10 = questions 1..=6 easy, subject 11 = 7..=10 hard;
/// module 2 (Word): subject 20 = questions 11..=15 medium.
/// Question `n` has operation points `100n + 1` and `100n + 2`.
pub fn pool_modules() -> Vec<Module> {
    let q = |id: i64, kind, difficulty| {
        question(id, kind, difficulty, 10, vec![op(id * 100 + 1, 5), op(id * 100 + 2, 5)])
    };
    vec![
        module(
            1,
            QuestionKind::Excel,
            vec![
                subject(10, (1..=6).map(|id| q(id, QuestionKind::Excel, Difficulty::Easy)).collect()),
                subject(11, (7..=10).map(|id| q(id, QuestionKind::Excel, Difficulty::Hard)).collect()),
            ],
        ),
        module(
            2,
            QuestionKind::Word,
            vec![subject(20, (11..=15).map(|id| q(id, QuestionKind::Word, Difficulty::Medium)).collect())],
        ),
    ]
}

pub fn rule(module_id: Option<i64>, subject_id: Option<i64>, count: u32, score_per_question: i64) -> ExtractionRule {
    ExtractionRule {
        module_id,
        subject_id,
        subject_type: None,
        question_type: None,
        kind: None,
        min_difficulty: None,
        max_difficulty: None,
        quota: Quota::Count(count),
        score_per_question: dec(score_per_question),
    }
}

/// 100-point mock exam: 3 easy Excel at 10, 2 hard Excel at 15, 4 Word at 10.
pub fn mock_rules(randomize: bool) -> ExtractionRuleSet {
    ExtractionRuleSet {
        rules: vec![
            rule(Some(1), Some(10), 3, 10),
            rule(Some(1), Some(11), 2, 15),
            rule(Some(2), None, 4, 10),
        ],
        randomize,
    }
}

pub fn mock_definition(randomize: bool) -> AssessmentDefinition {
    AssessmentDefinition {
        id: Uuid::new_v4(),
        name: "Mock exam".to_string(),
        kind: AssessmentKind::MockExam,
        total_score: dec(100),
        duration_minutes: 60,
        passing_score: dec(60),
        randomize,
        enabled: true,
        allow_retake: true,
        max_retake_count: 2,
        extraction_rules: Some(mock_rules(randomize)),
        modules: Vec::new(),
    }
}

/// Fixed exam with one question per entry in `scores`; question `i + 1`
/// carries a single operation point `(i + 1) * 100 + 1` worth the whole question.
pub fn exam_definition(scores: &[i64]) -> AssessmentDefinition {
    let questions = scores
        .iter()
        .enumerate()
        .map(|(i, &score)| {
            let id = i as i64 + 1;
            question(id, QuestionKind::Excel, Difficulty::Medium, score, vec![op(id * 100 + 1, score)])
        })
        .collect();
    AssessmentDefinition {
        id: Uuid::new_v4(),
        name: "Excel exam".to_string(),
        kind: AssessmentKind::Exam,
        total_score: scores.iter().copied().map(dec).sum(),
        duration_minutes: 60,
        passing_score: dec(60),
        randomize: false,
        enabled: true,
        allow_retake: false,
        max_retake_count: 0,
        extraction_rules: None,
        modules: vec![module(1, QuestionKind::Excel, vec![subject(10, questions)])],
    }
}

/// Comprehensive training whose tree is the mock exam pool.
pub fn pool_training() -> AssessmentDefinition {
    let modules = pool_modules();
    AssessmentDefinition {
        id: Uuid::new_v4(),
        name: "Office fundamentals".to_string(),
        kind: AssessmentKind::ComprehensiveTraining,
        total_score: modules.iter().map(|m| m.score).sum(),
        duration_minutes: 120,
        passing_score: dec(60),
        randomize: false,
        enabled: true,
        allow_retake: true,
        max_retake_count: 10,
        extraction_rules: None,
        modules,
    }
}
