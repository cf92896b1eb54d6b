//! In-process stores with the same guarantees as the Postgres ones. Used
//! by the test suite and for embedding the engine without a database.

use crate::database::attempt_store::AttemptStore;
use crate::database::definition_repo::DefinitionSource;
use crate::database::scoring_queue::{ScoringJob, ScoringQueue};
use crate::dto::scoring_dto::ScoringRequest;
use crate::error::{Error, Result};
use crate::models::assessment::{AssessmentDefinition, AssessmentKind};
use crate::models::question::Module;
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::extraction::ExtractedQuestionSet;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct AttemptTables {
    attempts: HashMap<Uuid, Attempt>,
    question_sets: HashMap<Uuid, ExtractedQuestionSet>,
}

#[derive(Default)]
pub struct MemoryAttemptStore {
    inner: Mutex<AttemptTables>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, AttemptTables> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn insert_attempt(
        &self,
        attempt: &Attempt,
        question_set: Option<&ExtractedQuestionSet>,
    ) -> Result<()> {
        let mut tables = self.tables();
        let same_pair = |a: &&Attempt| {
            a.student_id == attempt.student_id && a.assessment_id == attempt.assessment_id
        };
        if tables.attempts.values().filter(same_pair).any(|a| a.status.is_active()) {
            return Err(Error::DuplicateActiveAttempt {
                student_id: attempt.student_id,
                assessment_id: attempt.assessment_id,
            });
        }
        if tables
            .attempts
            .values()
            .filter(same_pair)
            .any(|a| a.attempt_number == attempt.attempt_number)
        {
            return Err(Error::AttemptNumberTaken {
                student_id: attempt.student_id,
                assessment_id: attempt.assessment_id,
                attempt_number: attempt.attempt_number,
            });
        }
        tables.attempts.insert(attempt.id, attempt.clone());
        if let Some(set) = question_set {
            tables.question_sets.insert(attempt.id, set.clone());
        }
        Ok(())
    }

    async fn get_attempt(&self, id: Uuid) -> Result<Option<Attempt>> {
        Ok(self.tables().attempts.get(&id).cloned())
    }

    async fn find_active(&self, student_id: Uuid, assessment_id: Uuid) -> Result<Option<Attempt>> {
        Ok(self
            .tables()
            .attempts
            .values()
            .find(|a| {
                a.student_id == student_id && a.assessment_id == assessment_id && a.status.is_active()
            })
            .cloned())
    }

    async fn list_attempts(&self, student_id: Uuid, assessment_id: Uuid) -> Result<Vec<Attempt>> {
        let mut rows: Vec<Attempt> = self
            .tables()
            .attempts
            .values()
            .filter(|a| a.student_id == student_id && a.assessment_id == assessment_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.attempt_number);
        Ok(rows)
    }

    async fn update_attempt(&self, attempt: &Attempt, expected_version: i32) -> Result<bool> {
        let mut tables = self.tables();
        match tables.attempts.get_mut(&attempt.id) {
            Some(current) if current.version == expected_version => {
                *current = attempt.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(Error::AttemptNotFound(attempt.id)),
        }
    }

    async fn question_set(&self, attempt_id: Uuid) -> Result<Option<ExtractedQuestionSet>> {
        Ok(self.tables().question_sets.get(&attempt_id).cloned())
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Attempt>> {
        let mut tables = self.tables();
        let mut expired = Vec::new();
        for attempt in tables.attempts.values_mut() {
            let overdue = attempt.status == AttemptStatus::InProgress
                && attempt.expires_at.is_some_and(|at| at < now);
            if overdue {
                attempt.status = AttemptStatus::Expired;
                attempt.version += 1;
                attempt.updated_at = now;
                expired.push(attempt.clone());
            }
        }
        Ok(expired)
    }

    async fn abandon_created_before(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Attempt>> {
        let mut tables = self.tables();
        let mut abandoned = Vec::new();
        for attempt in tables.attempts.values_mut() {
            if attempt.status == AttemptStatus::Created && attempt.created_at < cutoff {
                attempt.status = AttemptStatus::Abandoned;
                attempt.version += 1;
                attempt.updated_at = now;
                abandoned.push(attempt.clone());
            }
        }
        Ok(abandoned)
    }

    async fn status_distribution(&self) -> Result<HashMap<String, i64>> {
        let mut map = HashMap::new();
        for attempt in self.tables().attempts.values() {
            *map.entry(attempt.status.to_string()).or_insert(0) += 1;
        }
        Ok(map)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryJobStatus {
    Pending,
    Running,
    Dispatched,
    Failed,
}

#[derive(Debug, Clone)]
struct MemoryJob {
    job: ScoringJob,
    status: MemoryJobStatus,
    next_retry_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    seq: u64,
}

#[derive(Default)]
pub struct MemoryScoringQueue {
    jobs: Mutex<Vec<MemoryJob>>,
}

impl MemoryScoringQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, Vec<MemoryJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status_of(&self, job_id: Uuid) -> Option<MemoryJobStatus> {
        self.jobs().iter().find(|j| j.job.id == job_id).map(|j| j.status)
    }

    pub fn last_error(&self, job_id: Uuid) -> Option<String> {
        self.jobs()
            .iter()
            .find(|j| j.job.id == job_id)
            .and_then(|j| j.last_error.clone())
    }

    pub fn pending_for(&self, attempt_id: Uuid) -> usize {
        self.jobs()
            .iter()
            .filter(|j| j.job.request.attempt_id == attempt_id && j.status == MemoryJobStatus::Pending)
            .count()
    }
}

#[async_trait]
impl ScoringQueue for MemoryScoringQueue {
    async fn enqueue(&self, request: &ScoringRequest) -> Result<Uuid> {
        let mut jobs = self.jobs();
        let id = Uuid::new_v4();
        let seq = jobs.len() as u64;
        jobs.push(MemoryJob {
            job: ScoringJob {
                id,
                request: request.clone(),
                attempts: 0,
            },
            status: MemoryJobStatus::Pending,
            next_retry_at: None,
            last_error: None,
            seq,
        });
        Ok(id)
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<ScoringJob>> {
        let mut jobs = self.jobs();
        let next = jobs
            .iter_mut()
            .filter(|j| {
                j.status == MemoryJobStatus::Pending && j.next_retry_at.map_or(true, |at| at <= now)
            })
            .min_by_key(|j| j.seq);
        Ok(next.map(|j| {
            j.status = MemoryJobStatus::Running;
            j.job.attempts += 1;
            j.job.clone()
        }))
    }

    async fn mark_dispatched(&self, job_id: Uuid) -> Result<()> {
        if let Some(j) = self.jobs().iter_mut().find(|j| j.job.id == job_id) {
            j.status = MemoryJobStatus::Dispatched;
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if let Some(j) = self.jobs().iter_mut().find(|j| j.job.id == job_id) {
            j.last_error = Some(error.to_string());
            j.next_retry_at = retry_at;
            j.status = if retry_at.is_some() {
                MemoryJobStatus::Pending
            } else {
                MemoryJobStatus::Failed
            };
        }
        Ok(())
    }
}

/// Definitions held in insertion order.
#[derive(Default)]
pub struct MemoryDefinitions {
    definitions: Mutex<Vec<AssessmentDefinition>>,
}

impl MemoryDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, definition: AssessmentDefinition) {
        let mut definitions = self.definitions.lock().unwrap_or_else(|e| e.into_inner());
        definitions.retain(|d| d.id != definition.id);
        definitions.push(definition);
    }
}

#[async_trait]
impl DefinitionSource for MemoryDefinitions {
    async fn get_definition(&self, id: Uuid) -> Result<Option<AssessmentDefinition>> {
        let definitions = self.definitions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(definitions.iter().find(|d| d.id == id).cloned())
    }

    async fn load_bank_modules(&self) -> Result<Vec<Module>> {
        let definitions = self.definitions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(definitions
            .iter()
            .filter(|d| d.enabled && d.kind == AssessmentKind::ComprehensiveTraining)
            .flat_map(|d| d.modules.iter().cloned())
            .collect())
    }
}
