use crate::database::{DefinitionSource, ScoringQueue};
use crate::dto::attempt_dto::{
    AttemptStatusResponse, StartedAttempt, SubmitAttemptRequest, SubmittedAttempt,
};
use crate::dto::scoring_dto::{ScoringCallback, ScoringRequest};
use crate::error::{Error, Result};
use crate::models::assessment::AssessmentDefinition;
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::extraction::{ExtractedQuestionSet, ExtractionRuleSet};
use crate::models::scoring::AttemptScore;
use crate::services::attempt_service::AttemptService;
use crate::services::extraction_service::ExtractionEngine;
use crate::services::question_bank::QuestionBankIndex;
use crate::services::scoring_service::ScoringService;
use crate::utils::seed::derive_seed;
use crate::utils::validation::validate;
use std::sync::Arc;
use uuid::Uuid;

/// Plan/insert rounds before a start that keeps losing creation races gives up.
const MAX_PLANNING_ROUNDS: usize = 3;

/// Entry point for students: start, submit, abandon, poll. Holds no state
/// of its own beyond the services it composes.
#[derive(Clone)]
pub struct Orchestrator {
    attempts: AttemptService,
    scoring: ScoringService,
    queue: Arc<dyn ScoringQueue>,
    definitions: Arc<dyn DefinitionSource>,
}

impl Orchestrator {
    pub fn new(
        attempts: AttemptService,
        scoring: ScoringService,
        queue: Arc<dyn ScoringQueue>,
        definitions: Arc<dyn DefinitionSource>,
    ) -> Self {
        Self {
            attempts,
            scoring,
            queue,
            definitions,
        }
    }

    /// Looks the assessment up and starts it. Mock exams draw from the
    /// current bank of enabled comprehensive trainings.
    pub async fn start_assessment(&self, student_id: Uuid, assessment_id: Uuid) -> Result<StartedAttempt> {
        let definition = self
            .definitions
            .get_definition(assessment_id)
            .await?
            .ok_or(Error::AssessmentNotFound(assessment_id))?;

        let pool = if definition.kind.is_generated() {
            let modules = self.definitions.load_bank_modules().await?;
            let pool = QuestionBankIndex::new(&modules)?;
            tracing::debug!(questions = pool.len(), "Mock exam pool loaded");
            pool
        } else {
            QuestionBankIndex::default()
        };
        self.start_attempt(student_id, &definition, &pool).await
    }

    /// Starts a new attempt or resumes the active one.
    ///
    /// `pool` is the question pool mock exams are drawn from; other kinds
    /// use their own authored tree. The attempt and its question set are
    /// written together, so a crash can never leave one without the other.
    pub async fn start_attempt(
        &self,
        student_id: Uuid,
        definition: &AssessmentDefinition,
        pool: &QuestionBankIndex,
    ) -> Result<StartedAttempt> {
        for round in 0..MAX_PLANNING_ROUNDS {
            if let Some(active) = self.live_active(student_id, definition.id).await? {
                return self.resume(active).await;
            }

            let planned = match self.attempts.plan_attempt(student_id, definition).await {
                Ok(planned) => planned,
                // Another request created one after our lookup.
                Err(Error::DuplicateActiveAttempt { .. }) => continue,
                Err(e) => return Err(e),
            };

            let seed = derive_seed(
                student_id,
                definition.id,
                planned.created_at,
                planned.attempt_number,
            );
            let question_set = build_question_set(definition, pool, seed)?;

            let attempt = match self.attempts.insert_planned(planned, Some(&question_set)).await {
                Ok(attempt) => attempt,
                Err(e @ (Error::DuplicateActiveAttempt { .. } | Error::AttemptNumberTaken { .. })) => {
                    tracing::info!(
                        student_id = %student_id,
                        assessment_id = %definition.id,
                        round,
                        error = %e,
                        "Lost attempt creation race, planning again"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            let attempt = self.attempts.start(attempt.id).await?;
            return Ok(StartedAttempt {
                attempt,
                question_set,
                resumed: false,
            });
        }
        Err(Error::DuplicateActiveAttempt {
            student_id,
            assessment_id: definition.id,
        })
    }

    /// Completes the attempt and queues it for scoring. An attempt that is
    /// already completed or expired but not yet finalized is queued again.
    pub async fn submit_attempt(&self, request: &SubmitAttemptRequest) -> Result<SubmittedAttempt> {
        validate(request)?;
        let current = self.attempts.get_attempt(request.attempt_id).await?;

        let attempt = match current.status {
            AttemptStatus::InProgress => self.attempts.complete(current.id).await?,
            AttemptStatus::Completed | AttemptStatus::Expired if !current.score_finalized => current,
            from => {
                return Err(Error::InvalidTransition {
                    from,
                    to: AttemptStatus::Completed,
                })
            }
        };

        let question_set = self.stored_question_set(attempt.id).await?;
        let scoring_request = ScoringRequest {
            attempt_id: attempt.id,
            student_id: attempt.student_id,
            assessment_id: attempt.assessment_id,
            question_set,
            artifact_ref: request.artifact_ref.clone(),
        };
        let scoring_job_id = self.queue.enqueue(&scoring_request).await?;
        tracing::info!(
            attempt_id = %attempt.id,
            job_id = %scoring_job_id,
            status = %attempt.status,
            "Attempt submitted for scoring"
        );

        Ok(SubmittedAttempt {
            attempt,
            scoring_job_id,
        })
    }

    /// Scorer callback entry point.
    pub async fn record_scoring_result(&self, callback: &ScoringCallback) -> Result<AttemptScore> {
        self.scoring.merge(callback.attempt_id, callback).await
    }

    pub async fn abandon_attempt(&self, attempt_id: Uuid) -> Result<Attempt> {
        self.attempts.abandon(attempt_id).await
    }

    pub async fn status(&self, attempt_id: Uuid) -> Result<AttemptStatusResponse> {
        let attempt = self.attempts.get_attempt(attempt_id).await?;
        Ok(AttemptStatusResponse::from_attempt(&attempt, self.attempts.now()))
    }

    /// The pair's active attempt, unless it is past its deadline. An overdue
    /// attempt is expired on access instead of being handed back.
    async fn live_active(&self, student_id: Uuid, assessment_id: Uuid) -> Result<Option<Attempt>> {
        let Some(active) = self.attempts.find_active(student_id, assessment_id).await? else {
            return Ok(None);
        };
        let overdue = active.status == AttemptStatus::InProgress
            && active.expires_at.is_some_and(|at| self.attempts.now() > at);
        if !overdue {
            return Ok(Some(active));
        }
        match self.attempts.expire(active.id).await {
            Ok(_) => {}
            // Completed or abandoned concurrently; either way it is no longer active.
            Err(Error::InvalidTransition { .. }) => {}
            Err(e) => return Err(e),
        }
        tracing::info!(attempt_id = %active.id, "Overdue attempt expired on access");
        Ok(None)
    }

    async fn resume(&self, active: Attempt) -> Result<StartedAttempt> {
        let attempt = if active.status == AttemptStatus::Created {
            match self.attempts.start(active.id).await {
                Ok(started) => started,
                // Someone else started it first.
                Err(Error::InvalidTransition { .. }) => self.attempts.get_attempt(active.id).await?,
                Err(e) => return Err(e),
            }
        } else {
            active
        };
        let question_set = self.stored_question_set(attempt.id).await?;
        tracing::info!(attempt_id = %attempt.id, status = %attempt.status, "Attempt resumed");
        Ok(StartedAttempt {
            attempt,
            question_set,
            resumed: true,
        })
    }

    async fn stored_question_set(&self, attempt_id: Uuid) -> Result<ExtractedQuestionSet> {
        self.attempts
            .question_set(attempt_id)
            .await?
            .ok_or_else(|| Error::Internal(format!("attempt {} has no question set", attempt_id)))
    }
}

fn build_question_set(
    definition: &AssessmentDefinition,
    pool: &QuestionBankIndex,
    seed: u64,
) -> Result<ExtractedQuestionSet> {
    if definition.kind.is_generated() {
        let rules = definition.extraction_rules.as_ref().ok_or_else(|| {
            Error::InvalidRuleSet(format!("assessment {} has no extraction rules", definition.id))
        })?;
        // The definition's flag decides, whatever the stored rule JSON says.
        let rules = ExtractionRuleSet {
            randomize: definition.randomize,
            ..rules.clone()
        };
        ExtractionEngine::extract(&rules, definition.total_score, pool, seed)
    } else {
        let own = QuestionBankIndex::from_definition(definition)?;
        Ok(ExtractionEngine::materialize_fixed(&own, definition.randomize, seed))
    }
}
