use crate::dto::scoring_dto::ScoringRequest;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringJob {
    pub id: Uuid,
    pub request: ScoringRequest,
    /// Delivery attempts made so far, including the current one.
    pub attempts: i32,
}

/// Outbound scoring requests waiting to be delivered.
#[async_trait]
pub trait ScoringQueue: Send + Sync {
    async fn enqueue(&self, request: &ScoringRequest) -> Result<Uuid>;

    /// Claims the oldest pending job that is due, marking it running.
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<ScoringJob>>;

    async fn mark_dispatched(&self, job_id: Uuid) -> Result<()>;

    /// Records a failed delivery. With `retry_at` the job goes back to
    /// pending; without it the job is given up on.
    async fn mark_failed(
        &self,
        job_id: Uuid,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
}
