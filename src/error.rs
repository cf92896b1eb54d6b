use crate::models::attempt::AttemptStatus;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid extraction rule set: {0}")]
    InvalidRuleSet(String),

    #[error("Question pool too small for rule {rule_index}: need {required}, found {available}")]
    InsufficientPool {
        rule_index: usize,
        required: usize,
        available: usize,
    },

    #[error("Student {student_id} already has an active attempt at assessment {assessment_id}")]
    DuplicateActiveAttempt { student_id: Uuid, assessment_id: Uuid },

    #[error("Attempt number {attempt_number} already taken for student {student_id} at assessment {assessment_id}")]
    AttemptNumberTaken {
        student_id: Uuid,
        assessment_id: Uuid,
        attempt_number: i32,
    },

    #[error("Retake limit reached for assessment {assessment_id}: {attempts} attempts, {max_retakes} retakes allowed")]
    RetakeLimitExceeded {
        assessment_id: Uuid,
        attempts: i64,
        max_retakes: i32,
    },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: AttemptStatus,
        to: AttemptStatus,
    },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Unknown operation point: {0}")]
    UnknownOperationPoint(i64),

    #[error("Attempt not found: {0}")]
    AttemptNotFound(Uuid),

    #[error("Invalid question bank: {0}")]
    InvalidQuestionBank(String),

    #[error("Assessment not found: {0}")]
    AssessmentNotFound(Uuid),

    #[error("Assessment is disabled: {0}")]
    AssessmentDisabled(Uuid),

    #[error("Concurrent modification of attempt {0}")]
    Conflict(Uuid),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable identifier a caller can branch on when messaging the student.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::InvalidRuleSet(_) => "invalid_rule_set",
            Error::InsufficientPool { .. } => "insufficient_pool",
            Error::DuplicateActiveAttempt { .. } => "duplicate_active_attempt",
            Error::AttemptNumberTaken { .. } => "attempt_number_taken",
            Error::RetakeLimitExceeded { .. } => "retake_limit_exceeded",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::InvalidTimestamp(_) => "invalid_timestamp",
            Error::UnknownOperationPoint(_) => "unknown_operation_point",
            Error::AttemptNotFound(_) => "attempt_not_found",
            Error::InvalidQuestionBank(_) => "invalid_question_bank",
            Error::AssessmentNotFound(_) => "assessment_not_found",
            Error::AssessmentDisabled(_) => "assessment_disabled",
            Error::Conflict(_) => "conflict",
            Error::Database(_) | Error::Migrate(_) => "database",
            Error::Validation(_) => "validation",
            Error::Json(_) => "json",
            Error::Reqwest(_) => "scorer_unreachable",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database(err)
    }
}
