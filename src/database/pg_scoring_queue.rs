use crate::database::scoring_queue::{ScoringJob, ScoringQueue};
use crate::dto::scoring_dto::ScoringRequest;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgScoringQueue {
    pool: PgPool,
}

impl PgScoringQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScoringQueue for PgScoringQueue {
    async fn enqueue(&self, request: &ScoringRequest) -> Result<Uuid> {
        let row = sqlx::query(
            r#"
            INSERT INTO scoring_jobs (attempt_id, payload)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(request.attempt_id)
        .bind(serde_json::to_value(request)?)
        .fetch_one(&self.pool)
        .await?;
        let id: Uuid = row.try_get("id")?;
        Ok(id)
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<ScoringJob>> {
        let rec = sqlx::query(
            r#"
            UPDATE scoring_jobs
            SET status = 'running', attempts = attempts + 1, updated_at = $1
            WHERE id = (
                SELECT id FROM scoring_jobs
                WHERE status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= $1)
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, payload, attempts
            "#,
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = rec else { return Ok(None) };
        let payload: JsonValue = row.try_get("payload")?;
        Ok(Some(ScoringJob {
            id: row.try_get("id")?,
            request: serde_json::from_value(payload)?,
            attempts: row.try_get("attempts")?,
        }))
    }

    async fn mark_dispatched(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"UPDATE scoring_jobs SET status = 'dispatched', last_error = NULL, updated_at = NOW() WHERE id = $1"#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scoring_jobs
            SET status = CASE WHEN $3::timestamptz IS NULL THEN 'failed' ELSE 'pending' END,
                last_error = $2,
                next_retry_at = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .bind(retry_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
