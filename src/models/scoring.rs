use crate::dto::scoring_dto::OperationPointResult;
use crate::error::Result;
use crate::models::attempt::Attempt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Accumulated scorer output kept in the attempt's `scoring_result` column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedScoringState {
    #[serde(default)]
    pub operation_points: BTreeMap<i64, OperationPointResult>,
    #[serde(default)]
    pub callbacks_received: u32,
    #[serde(default)]
    pub completed_fully: bool,
}

impl MergedScoringState {
    /// Decodes the state stored on `attempt`; empty when nothing was merged yet.
    pub fn of(attempt: &Attempt) -> Result<Self> {
        match &attempt.scoring_result {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Ok(Self::default()),
        }
    }

    pub fn earned(&self) -> Decimal {
        self.operation_points.values().map(|r| r.earned).sum()
    }
}

/// Freezes the score of a terminal attempt whose scorer already reported
/// the whole paper. Returns whether anything changed.
pub fn finalize_if_fully_scored(attempt: &mut Attempt) -> Result<bool> {
    if attempt.score_finalized || !attempt.status.is_terminal() {
        return Ok(false);
    }
    let state = MergedScoringState::of(attempt)?;
    if !state.completed_fully {
        return Ok(false);
    }
    let score = state.earned();
    attempt.score = Some(score);
    attempt.score_finalized = true;
    attempt.passed = Some(score >= attempt.passing_score);
    Ok(true)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptScore {
    pub attempt_id: Uuid,
    pub score: Decimal,
    pub max_score: Decimal,
    /// 0..=100, two decimal places.
    pub completion_percentage: Decimal,
    pub graded_operation_points: usize,
    pub total_operation_points: usize,
    pub finalized: bool,
    pub passed: Option<bool>,
    /// Operation point ids in the callback that the paper does not contain.
    pub skipped_operation_points: Vec<i64>,
}
