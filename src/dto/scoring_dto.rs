use crate::models::extraction::ExtractedQuestionSet;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("must_not_be_negative"));
    }
    Ok(())
}

/// Grading outcome for one operation point, as reported by the scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct OperationPointResult {
    pub operation_point_id: i64,
    #[validate(custom(function = validate_non_negative))]
    pub earned: Decimal,
    #[validate(custom(function = validate_non_negative))]
    pub max: Decimal,
    pub passed: bool,
    #[validate(length(max = 4000))]
    #[serde(default)]
    pub detail: Option<String>,
}

/// Callback payload from the scoring collaborator. May be partial and may
/// arrive more than once for the same attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ScoringCallback {
    pub attempt_id: Uuid,
    #[validate(nested)]
    #[serde(default)]
    pub results: Vec<OperationPointResult>,
    #[serde(default)]
    pub completed_fully: bool,
}

/// Outbound request asking the scorer to grade a submitted attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ScoringRequest {
    pub attempt_id: Uuid,
    pub student_id: Uuid,
    pub assessment_id: Uuid,
    pub question_set: ExtractedQuestionSet,
    #[validate(length(min = 1, max = 1024))]
    pub artifact_ref: String,
}
