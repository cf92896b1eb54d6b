use crate::database::AttemptStore;
use crate::error::{Error, Result};
use crate::models::assessment::AssessmentDefinition;
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::extraction::ExtractedQuestionSet;
use crate::models::scoring::{finalize_if_fully_scored, MergedScoringState};
use crate::utils::time::Clock;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Compare-and-swap attempts before a mutation gives up with `Conflict`.
const MAX_CAS_RETRIES: usize = 5;

/// Result of applying a mutation to a loaded attempt.
pub(crate) enum Mutation {
    Changed,
    Unchanged,
}

/// Owns the attempt state machine:
/// `Created -> InProgress -> {Completed, Expired, Abandoned}`.
#[derive(Clone)]
pub struct AttemptService {
    store: Arc<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
}

impl AttemptService {
    pub fn new(store: Arc<dyn AttemptStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Checks the one-active and retake rules and builds the next attempt
    /// for the pair without persisting it.
    pub async fn plan_attempt(
        &self,
        student_id: Uuid,
        definition: &AssessmentDefinition,
    ) -> Result<Attempt> {
        if !definition.enabled {
            return Err(Error::AssessmentDisabled(definition.id));
        }

        let history = self.store.list_attempts(student_id, definition.id).await?;
        if history.iter().any(|a| a.status.is_active()) {
            return Err(Error::DuplicateActiveAttempt {
                student_id,
                assessment_id: definition.id,
            });
        }

        let used = history.len() as i64;
        if used >= definition.max_attempts() {
            return Err(Error::RetakeLimitExceeded {
                assessment_id: definition.id,
                attempts: used,
                max_retakes: if definition.allow_retake {
                    definition.max_retake_count
                } else {
                    0
                },
            });
        }

        let next_number = history
            .iter()
            .map(|a| a.attempt_number)
            .max()
            .unwrap_or(0)
            + 1;

        Ok(Attempt::new(
            student_id,
            definition.id,
            definition.kind,
            next_number,
            definition.duration_minutes,
            definition.passing_score,
            self.clock.now(),
        ))
    }

    /// Persists a planned attempt, together with its question set when one
    /// is given, in a single write.
    pub async fn insert_planned(
        &self,
        attempt: Attempt,
        question_set: Option<&ExtractedQuestionSet>,
    ) -> Result<Attempt> {
        self.store.insert_attempt(&attempt, question_set).await?;
        tracing::info!(
            attempt_id = %attempt.id,
            student_id = %attempt.student_id,
            assessment_id = %attempt.assessment_id,
            attempt_number = attempt.attempt_number,
            "Attempt created"
        );
        Ok(attempt)
    }

    pub async fn create_attempt(
        &self,
        student_id: Uuid,
        definition: &AssessmentDefinition,
    ) -> Result<Attempt> {
        let attempt = self.plan_attempt(student_id, definition).await?;
        self.insert_planned(attempt, None).await
    }

    pub async fn start(&self, attempt_id: Uuid) -> Result<Attempt> {
        let attempt = self
            .mutate(attempt_id, |attempt, now| {
                if attempt.status != AttemptStatus::Created {
                    return Err(Error::InvalidTransition {
                        from: attempt.status,
                        to: AttemptStatus::InProgress,
                    });
                }
                if now < attempt.created_at {
                    return Err(Error::InvalidTimestamp(format!(
                        "start time {} precedes creation time {}",
                        now, attempt.created_at
                    )));
                }
                attempt.started_at = Some(now);
                attempt.expires_at = Some(now + Duration::minutes(attempt.duration_minutes as i64));
                attempt.status = AttemptStatus::InProgress;
                Ok(Mutation::Changed)
            })
            .await?;
        tracing::info!(attempt_id = %attempt.id, expires_at = ?attempt.expires_at, "Attempt started");
        Ok(attempt)
    }

    /// Expires one overdue attempt. Re-running it on an expired attempt is a no-op.
    pub async fn expire(&self, attempt_id: Uuid) -> Result<Attempt> {
        self.mutate(attempt_id, |attempt, now| match attempt.status {
            AttemptStatus::Expired => Ok(Mutation::Unchanged),
            AttemptStatus::InProgress => match attempt.expires_at {
                Some(expires_at) if now > expires_at => {
                    attempt.status = AttemptStatus::Expired;
                    finalize_if_fully_scored(attempt)?;
                    tracing::info!(attempt_id = %attempt.id, "Attempt expired");
                    Ok(Mutation::Changed)
                }
                Some(expires_at) => Err(Error::InvalidTimestamp(format!(
                    "attempt {} runs until {}",
                    attempt.id, expires_at
                ))),
                None => Err(Error::Internal(format!(
                    "attempt {} is in progress without a deadline",
                    attempt.id
                ))),
            },
            from => Err(Error::InvalidTransition {
                from,
                to: AttemptStatus::Expired,
            }),
        })
        .await
    }

    pub async fn complete(&self, attempt_id: Uuid) -> Result<Attempt> {
        let attempt = self
            .mutate(attempt_id, |attempt, now| {
                if attempt.status != AttemptStatus::InProgress {
                    return Err(Error::InvalidTransition {
                        from: attempt.status,
                        to: AttemptStatus::Completed,
                    });
                }
                let started_at = attempt.started_at.ok_or_else(|| {
                    Error::Internal(format!("attempt {} is in progress without a start", attempt.id))
                })?;
                if now < started_at {
                    return Err(Error::InvalidTimestamp(format!(
                        "completion time {} precedes start time {}",
                        now, started_at
                    )));
                }
                attempt.completed_at = Some(now);
                attempt.duration_seconds = Some((now - started_at).num_seconds());
                attempt.status = AttemptStatus::Completed;
                finalize_if_fully_scored(attempt)?;
                Ok(Mutation::Changed)
            })
            .await?;
        tracing::info!(
            attempt_id = %attempt.id,
            duration_seconds = ?attempt.duration_seconds,
            "Attempt completed"
        );
        Ok(attempt)
    }

    /// Student-initiated cancellation. Idempotent on terminal attempts.
    pub async fn abandon(&self, attempt_id: Uuid) -> Result<Attempt> {
        self.mutate(attempt_id, |attempt, _now| {
            if attempt.status.is_terminal() {
                return Ok(Mutation::Unchanged);
            }
            attempt.status = AttemptStatus::Abandoned;
            finalize_if_fully_scored(attempt)?;
            tracing::info!(attempt_id = %attempt.id, "Attempt abandoned");
            Ok(Mutation::Changed)
        })
        .await
    }

    /// One pass of the expiry sweep over every overdue in-progress attempt.
    pub async fn expire_overdue(&self) -> Result<Vec<Attempt>> {
        let now = self.clock.now();
        let mut expired = self.store.expire_overdue(now).await?;
        for attempt in expired.iter_mut() {
            // The bulk update only flips status; freeze scores the scorer already finished.
            if MergedScoringState::of(attempt)?.completed_fully {
                *attempt = self
                    .mutate(attempt.id, |attempt, _now| {
                        if finalize_if_fully_scored(attempt)? {
                            Ok(Mutation::Changed)
                        } else {
                            Ok(Mutation::Unchanged)
                        }
                    })
                    .await?;
            }
        }
        for attempt in &expired {
            tracing::info!(
                attempt_id = %attempt.id,
                student_id = %attempt.student_id,
                expires_at = ?attempt.expires_at,
                "Attempt expired by sweep"
            );
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expiry sweep finished");
        }
        Ok(expired)
    }

    /// Abandons attempts that were created but never started within `max_age`.
    pub async fn abandon_stale_created(&self, max_age: Duration) -> Result<Vec<Attempt>> {
        let now = self.clock.now();
        let abandoned = self.store.abandon_created_before(now - max_age, now).await?;
        if !abandoned.is_empty() {
            tracing::info!(count = abandoned.len(), "Abandoned stale created attempts");
        }
        Ok(abandoned)
    }

    pub async fn get_attempt(&self, attempt_id: Uuid) -> Result<Attempt> {
        self.store
            .get_attempt(attempt_id)
            .await?
            .ok_or(Error::AttemptNotFound(attempt_id))
    }

    pub async fn find_active(
        &self,
        student_id: Uuid,
        assessment_id: Uuid,
    ) -> Result<Option<Attempt>> {
        self.store.find_active(student_id, assessment_id).await
    }

    pub async fn list_attempts(&self, student_id: Uuid, assessment_id: Uuid) -> Result<Vec<Attempt>> {
        self.store.list_attempts(student_id, assessment_id).await
    }

    pub async fn question_set(&self, attempt_id: Uuid) -> Result<Option<ExtractedQuestionSet>> {
        self.store.question_set(attempt_id).await
    }

    pub async fn status_distribution(&self) -> Result<HashMap<String, i64>> {
        self.store.status_distribution().await
    }

    /// Loads the attempt, applies `apply` to a copy and writes it back
    /// guarded by the version it was read at. Lost races reload and retry.
    pub(crate) async fn mutate<F>(&self, attempt_id: Uuid, mut apply: F) -> Result<Attempt>
    where
        F: FnMut(&mut Attempt, DateTime<Utc>) -> Result<Mutation> + Send,
    {
        for retry in 0..MAX_CAS_RETRIES {
            let current = self.get_attempt(attempt_id).await?;
            let now = self.clock.now();
            let mut next = current.clone();
            match apply(&mut next, now)? {
                Mutation::Unchanged => return Ok(current),
                Mutation::Changed => {
                    next.version = current.version + 1;
                    next.updated_at = now;
                    if self.store.update_attempt(&next, current.version).await? {
                        return Ok(next);
                    }
                    tracing::warn!(attempt_id = %attempt_id, retry, "Attempt changed concurrently, retrying");
                }
            }
        }
        Err(Error::Conflict(attempt_id))
    }
}
