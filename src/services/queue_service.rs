use crate::database::ScoringQueue;
use crate::error::Result;
use crate::services::scorer_client::ScoringCollaborator;
use crate::services::scoring_service::ScoringService;
use crate::utils::time::Clock;
use chrono::Duration;
use std::sync::Arc;

const BASE_RETRY_SECS: i64 = 30;
const MAX_RETRY_SECS: i64 = 3600;

/// Backoff before delivery attempt `attempts + 1`: 30s, 60s, 120s, ... capped at an hour.
pub fn retry_delay(attempts: i32) -> Duration {
    let exponent = (attempts - 1).clamp(0, 16) as u32;
    let secs = BASE_RETRY_SECS.saturating_mul(2i64.pow(exponent));
    Duration::seconds(secs.min(MAX_RETRY_SECS))
}

/// Delivers queued scoring requests to the scorer one job at a time.
#[derive(Clone)]
pub struct ScoringWorker {
    queue: Arc<dyn ScoringQueue>,
    scorer: Arc<dyn ScoringCollaborator>,
    scoring: ScoringService,
    clock: Arc<dyn Clock>,
    max_attempts: i32,
}

impl ScoringWorker {
    pub fn new(
        queue: Arc<dyn ScoringQueue>,
        scorer: Arc<dyn ScoringCollaborator>,
        scoring: ScoringService,
        clock: Arc<dyn Clock>,
        max_attempts: i32,
    ) -> Self {
        Self {
            queue,
            scorer,
            scoring,
            clock,
            max_attempts,
        }
    }

    /// Processes at most one due job. Returns `false` when the queue had nothing to do.
    ///
    /// A job only counts as dispatched once any inline result has been merged;
    /// a failed request or merge goes back on the queue with backoff.
    pub async fn run_once(&self) -> Result<bool> {
        let now = self.clock.now();
        let Some(job) = self.queue.claim_next(now).await? else {
            return Ok(false);
        };
        let attempt_id = job.request.attempt_id;

        let outcome = match self.scorer.request_scoring(&job.request).await {
            Ok(Some(callback)) => self.scoring.merge(attempt_id, &callback).await.map(|_| ()),
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                self.queue.mark_dispatched(job.id).await?;
                tracing::info!(job_id = %job.id, attempt_id = %attempt_id, "Scoring request dispatched");
            }
            Err(e) => {
                let retry_at = (job.attempts < self.max_attempts)
                    .then(|| now + retry_delay(job.attempts));
                match retry_at {
                    Some(at) => tracing::warn!(
                        job_id = %job.id,
                        attempt_id = %attempt_id,
                        attempts = job.attempts,
                        retry_at = %at,
                        error = %e,
                        "Scoring job failed, will retry"
                    ),
                    None => tracing::error!(
                        job_id = %job.id,
                        attempt_id = %attempt_id,
                        attempts = job.attempts,
                        error = %e,
                        "Scoring job failed permanently"
                    ),
                }
                self.queue.mark_failed(job.id, &e.to_string(), retry_at).await?;
            }
        }
        Ok(true)
    }
}
