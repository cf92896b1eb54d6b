use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::extraction::ExtractedQuestionSet;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartedAttempt {
    pub attempt: Attempt,
    pub question_set: ExtractedQuestionSet,
    /// True when an already-active attempt was picked up instead of a new one.
    pub resumed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitAttemptRequest {
    pub attempt_id: Uuid,
    /// Path or workspace id of the student's work; opaque to the engine.
    #[validate(length(min = 1, max = 1024))]
    pub artifact_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptStatusResponse {
    pub attempt_id: Uuid,
    pub status: AttemptStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub time_remaining_seconds: Option<i64>,
    pub score: Option<Decimal>,
    pub max_score: Option<Decimal>,
    pub completion_percentage: Option<Decimal>,
    pub score_finalized: bool,
}

impl AttemptStatusResponse {
    pub fn from_attempt(attempt: &Attempt, now: DateTime<Utc>) -> Self {
        let time_remaining_seconds = match (attempt.status, attempt.expires_at) {
            (AttemptStatus::InProgress, Some(expires_at)) => {
                Some((expires_at - now).num_seconds().max(0))
            }
            _ => None,
        };
        Self {
            attempt_id: attempt.id,
            status: attempt.status,
            started_at: attempt.started_at,
            expires_at: attempt.expires_at,
            time_remaining_seconds,
            score: attempt.score,
            max_score: attempt.max_score,
            completion_percentage: attempt.completion_percentage,
            score_finalized: attempt.score_finalized,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedAttempt {
    pub attempt: Attempt,
    pub scoring_job_id: Uuid,
}
