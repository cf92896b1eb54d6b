use crate::dto::scoring_dto::{OperationPointResult, ScoringCallback};
use crate::error::{Error, Result};
use crate::models::question::Scoreable;
use crate::models::scoring::{finalize_if_fully_scored, AttemptScore, MergedScoringState};
use crate::services::attempt_service::{AttemptService, Mutation};
use crate::utils::validation::validate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

/// Folds scorer callbacks into an attempt's score. Results are merged
/// last-write-wins per operation point, so repeated or partial callbacks
/// never lose points already graded.
#[derive(Clone)]
pub struct ScoringService {
    attempts: AttemptService,
}

impl ScoringService {
    pub fn new(attempts: AttemptService) -> Self {
        Self { attempts }
    }

    pub async fn merge(&self, attempt_id: Uuid, callback: &ScoringCallback) -> Result<AttemptScore> {
        validate(callback)?;
        if callback.attempt_id != attempt_id {
            return Err(Error::Internal(format!(
                "callback for attempt {} delivered to attempt {}",
                callback.attempt_id, attempt_id
            )));
        }

        // Fatal for the call when the attempt does not exist.
        self.attempts.get_attempt(attempt_id).await?;
        let question_set = self.attempts.question_set(attempt_id).await?.ok_or_else(|| {
            Error::Internal(format!("attempt {} has no question set", attempt_id))
        })?;

        let max_score = question_set.total_score();
        let total_operation_points = question_set.operation_point_count();

        let authored: HashMap<i64, Decimal> = question_set
            .operation_points()
            .map(|op| (op.scoreable_id(), op.max_score()))
            .collect();

        let mut known: Vec<OperationPointResult> = Vec::with_capacity(callback.results.len());
        let mut skipped = Vec::new();
        for result in &callback.results {
            let Some(&ceiling) = authored.get(&result.operation_point_id) else {
                let err = Error::UnknownOperationPoint(result.operation_point_id);
                tracing::warn!(attempt_id = %attempt_id, error = %err, "Skipping scorer result");
                skipped.push(result.operation_point_id);
                continue;
            };
            let mut result = result.clone();
            if result.earned > ceiling {
                tracing::warn!(
                    attempt_id = %attempt_id,
                    operation_point_id = result.operation_point_id,
                    earned = %result.earned,
                    max = %ceiling,
                    "Scorer awarded more than the operation point is worth, capping"
                );
                result.earned = ceiling;
            }
            known.push(result);
        }

        let attempt = self
            .attempts
            .mutate(attempt_id, |attempt, _now| {
                if attempt.score_finalized {
                    return Ok(Mutation::Unchanged);
                }

                let mut state = MergedScoringState::of(attempt)?;
                for result in &known {
                    state
                        .operation_points
                        .insert(result.operation_point_id, result.clone());
                }
                state.callbacks_received += 1;
                state.completed_fully |= callback.completed_fully;

                attempt.score = Some(state.earned());
                attempt.max_score = Some(max_score);
                attempt.completion_percentage = Some(completion_percentage(
                    state.operation_points.len(),
                    total_operation_points,
                ));
                attempt.scoring_result = Some(serde_json::to_value(&state)?);
                finalize_if_fully_scored(attempt)?;
                Ok(Mutation::Changed)
            })
            .await?;

        let state = MergedScoringState::of(&attempt)?;
        tracing::info!(
            attempt_id = %attempt_id,
            score = ?attempt.score,
            graded = state.operation_points.len(),
            total = total_operation_points,
            finalized = attempt.score_finalized,
            "Scoring result merged"
        );

        Ok(AttemptScore {
            attempt_id,
            score: attempt.score.unwrap_or(Decimal::ZERO),
            max_score: attempt.max_score.unwrap_or(max_score),
            completion_percentage: attempt.completion_percentage.unwrap_or(Decimal::ZERO),
            graded_operation_points: state.operation_points.len(),
            total_operation_points,
            finalized: attempt.score_finalized,
            passed: attempt.passed,
            skipped_operation_points: skipped,
        })
    }
}

/// Graded share of the paper's operation points, 0..=100 with two decimals.
pub fn completion_percentage(graded: usize, total: usize) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(graded as u64) * Decimal::ONE_HUNDRED / Decimal::from(total as u64)).round_dp(2)
}
