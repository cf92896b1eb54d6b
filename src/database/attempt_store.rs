use crate::error::Result;
use crate::models::attempt::Attempt;
use crate::models::extraction::ExtractedQuestionSet;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Persistence for attempts and their question sets.
///
/// Implementations must make `insert_attempt` a compare-and-insert on the
/// active (student, assessment) key and `update_attempt` a compare-and-swap
/// on `version`; every other guarantee in the lifecycle builds on those two.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Inserts a `Created` attempt together with its question set, atomically.
    /// Fails with `DuplicateActiveAttempt` when the pair already has an active
    /// attempt and with `AttemptNumberTaken` when another writer already used
    /// the attempt number.
    async fn insert_attempt(
        &self,
        attempt: &Attempt,
        question_set: Option<&ExtractedQuestionSet>,
    ) -> Result<()>;

    async fn get_attempt(&self, id: Uuid) -> Result<Option<Attempt>>;

    async fn find_active(&self, student_id: Uuid, assessment_id: Uuid) -> Result<Option<Attempt>>;

    /// All attempts for the pair, oldest first.
    async fn list_attempts(&self, student_id: Uuid, assessment_id: Uuid) -> Result<Vec<Attempt>>;

    /// Writes `attempt` if the stored row still has `expected_version`.
    /// Returns false when another writer got there first.
    async fn update_attempt(&self, attempt: &Attempt, expected_version: i32) -> Result<bool>;

    async fn question_set(&self, attempt_id: Uuid) -> Result<Option<ExtractedQuestionSet>>;

    /// Moves every `InProgress` attempt whose deadline is before `now` to
    /// `Expired` and returns them. Returns nothing when another process
    /// currently owns the sweep.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Attempt>>;

    /// Moves `Created` attempts created before `cutoff` to `Abandoned`.
    async fn abandon_created_before(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Attempt>>;

    async fn status_distribution(&self) -> Result<HashMap<String, i64>>;
}
