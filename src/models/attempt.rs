use crate::error::{Error, Result};
use crate::models::assessment::AssessmentKind;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Created,
    InProgress,
    Completed,
    Expired,
    Abandoned,
}

impl AttemptStatus {
    pub const ACTIVE: [AttemptStatus; 2] = [AttemptStatus::Created, AttemptStatus::InProgress];

    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::Created => "created",
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Expired => "expired",
            AttemptStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, AttemptStatus::Created | AttemptStatus::InProgress)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(AttemptStatus::Created),
            "in_progress" => Ok(AttemptStatus::InProgress),
            "completed" => Ok(AttemptStatus::Completed),
            "expired" => Ok(AttemptStatus::Expired),
            "abandoned" => Ok(AttemptStatus::Abandoned),
            other => Err(Error::Internal(format!("unknown attempt status '{}'", other))),
        }
    }
}

/// One student's pass at one assessment (the completion record).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: Uuid,
    pub student_id: Uuid,
    pub assessment_id: Uuid,
    pub assessment_kind: AssessmentKind,
    pub attempt_number: i32,
    /// Time box and pass mark copied from the definition when the attempt was created.
    pub duration_minutes: i32,
    pub passing_score: Decimal,
    pub status: AttemptStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub score: Option<Decimal>,
    pub max_score: Option<Decimal>,
    pub completion_percentage: Option<Decimal>,
    pub passed: Option<bool>,
    pub scoring_result: Option<JsonValue>,
    pub score_finalized: bool,
    pub version: i32,
    pub updated_at: DateTime<Utc>,
}

impl Attempt {
    pub fn new(
        student_id: Uuid,
        assessment_id: Uuid,
        assessment_kind: AssessmentKind,
        attempt_number: i32,
        duration_minutes: i32,
        passing_score: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            assessment_id,
            assessment_kind,
            attempt_number,
            duration_minutes,
            passing_score,
            status: AttemptStatus::Created,
            created_at,
            started_at: None,
            expires_at: None,
            completed_at: None,
            duration_seconds: None,
            score: None,
            max_score: None,
            completion_percentage: None,
            passed: None,
            scoring_result: None,
            score_finalized: false,
            version: 0,
            updated_at: created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AttemptRow {
    pub id: Uuid,
    pub student_id: Uuid,
    pub assessment_id: Uuid,
    pub assessment_kind: String,
    pub attempt_number: i32,
    pub duration_minutes: i32,
    pub passing_score: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub score: Option<Decimal>,
    pub max_score: Option<Decimal>,
    pub completion_percentage: Option<Decimal>,
    pub passed: Option<bool>,
    pub scoring_result: Option<JsonValue>,
    pub score_finalized: bool,
    pub version: i32,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = Error;

    fn try_from(row: AttemptRow) -> Result<Self> {
        let assessment_kind = serde_json::from_value(JsonValue::String(row.assessment_kind))?;
        Ok(Self {
            id: row.id,
            student_id: row.student_id,
            assessment_id: row.assessment_id,
            assessment_kind,
            attempt_number: row.attempt_number,
            duration_minutes: row.duration_minutes,
            passing_score: row.passing_score,
            status: row.status.parse()?,
            created_at: row.created_at,
            started_at: row.started_at,
            expires_at: row.expires_at,
            completed_at: row.completed_at,
            duration_seconds: row.duration_seconds,
            score: row.score,
            max_score: row.max_score,
            completion_percentage: row.completion_percentage,
            passed: row.passed,
            scoring_result: row.scoring_result,
            score_finalized: row.score_finalized,
            version: row.version,
            updated_at: row.updated_at,
        })
    }
}
