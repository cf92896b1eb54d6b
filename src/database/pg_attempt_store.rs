use crate::database::attempt_store::AttemptStore;
use crate::error::{Error, Result};
use crate::models::attempt::{Attempt, AttemptRow};
use crate::models::extraction::ExtractedQuestionSet;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

/// Advisory lock key held for the duration of one expiry sweep.
const SWEEP_LOCK_KEY: i64 = 0x6174_7465_6d70_7473;

const UNIQUE_VIOLATION: &str = "23505";
const NUMBER_CONSTRAINT: &str = "uq_attempts_number";

#[derive(Clone)]
pub struct PgAttemptStore {
    pool: PgPool,
}

impl PgAttemptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn rows_to_attempts(rows: Vec<AttemptRow>) -> Result<Vec<Attempt>> {
    rows.into_iter().map(Attempt::try_from).collect()
}

#[async_trait]
impl AttemptStore for PgAttemptStore {
    async fn insert_attempt(
        &self,
        attempt: &Attempt,
        question_set: Option<&ExtractedQuestionSet>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO attempts (
                id, student_id, assessment_id, assessment_kind, attempt_number, duration_minutes, passing_score, status,
                created_at, started_at, expires_at, completed_at, duration_seconds,
                score, max_score, completion_percentage, passed, scoring_result,
                score_finalized, version, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8,
                $9, NULL, NULL, NULL, NULL,
                NULL, NULL, NULL, NULL, NULL,
                FALSE, $10, $11
            )
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.student_id)
        .bind(attempt.assessment_id)
        .bind(attempt.assessment_kind.as_str())
        .bind(attempt.attempt_number)
        .bind(attempt.duration_minutes)
        .bind(attempt.passing_score)
        .bind(attempt.status.as_str())
        .bind(attempt.created_at)
        .bind(attempt.version)
        .bind(attempt.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            if let sqlx::Error::Database(db_err) = &err {
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                    if db_err.constraint() == Some(NUMBER_CONSTRAINT) {
                        return Err(Error::AttemptNumberTaken {
                            student_id: attempt.student_id,
                            assessment_id: attempt.assessment_id,
                            attempt_number: attempt.attempt_number,
                        });
                    }
                    return Err(Error::DuplicateActiveAttempt {
                        student_id: attempt.student_id,
                        assessment_id: attempt.assessment_id,
                    });
                }
            }
            return Err(err.into());
        }

        if let Some(set) = question_set {
            sqlx::query(
                r#"
                INSERT INTO attempt_question_sets (attempt_id, seed, randomized, question_set)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(attempt.id)
            .bind(set.seed as i64)
            .bind(set.randomized)
            .bind(serde_json::to_value(set)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_attempt(&self, id: Uuid) -> Result<Option<Attempt>> {
        let row = sqlx::query_as::<_, AttemptRow>(r#"SELECT * FROM attempts WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Attempt::try_from).transpose()
    }

    async fn find_active(&self, student_id: Uuid, assessment_id: Uuid) -> Result<Option<Attempt>> {
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT * FROM attempts
            WHERE student_id = $1 AND assessment_id = $2
              AND status IN ('created', 'in_progress')
            "#,
        )
        .bind(student_id)
        .bind(assessment_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Attempt::try_from).transpose()
    }

    async fn list_attempts(&self, student_id: Uuid, assessment_id: Uuid) -> Result<Vec<Attempt>> {
        let rows = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT * FROM attempts
            WHERE student_id = $1 AND assessment_id = $2
            ORDER BY attempt_number ASC
            "#,
        )
        .bind(student_id)
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await?;
        rows_to_attempts(rows)
    }

    async fn update_attempt(&self, attempt: &Attempt, expected_version: i32) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE attempts
            SET status = $3,
                started_at = $4,
                expires_at = $5,
                completed_at = $6,
                duration_seconds = $7,
                score = $8,
                max_score = $9,
                completion_percentage = $10,
                passed = $11,
                scoring_result = $12,
                score_finalized = $13,
                version = $14,
                updated_at = $15
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(attempt.id)
        .bind(expected_version)
        .bind(attempt.status.as_str())
        .bind(attempt.started_at)
        .bind(attempt.expires_at)
        .bind(attempt.completed_at)
        .bind(attempt.duration_seconds)
        .bind(attempt.score)
        .bind(attempt.max_score)
        .bind(attempt.completion_percentage)
        .bind(attempt.passed)
        .bind(attempt.scoring_result.clone())
        .bind(attempt.score_finalized)
        .bind(attempt.version)
        .bind(attempt.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM attempts WHERE id = $1)"#)
                .bind(attempt.id)
                .fetch_one(&self.pool)
                .await?;
        if exists {
            Ok(false)
        } else {
            Err(Error::AttemptNotFound(attempt.id))
        }
    }

    async fn question_set(&self, attempt_id: Uuid) -> Result<Option<ExtractedQuestionSet>> {
        let value: Option<serde_json::Value> = sqlx::query_scalar(
            r#"SELECT question_set FROM attempt_question_sets WHERE attempt_id = $1"#,
        )
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value.map(serde_json::from_value).transpose()?)
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Attempt>> {
        let mut tx = self.pool.begin().await?;

        let owned: bool = sqlx::query_scalar(r#"SELECT pg_try_advisory_xact_lock($1)"#)
            .bind(SWEEP_LOCK_KEY)
            .fetch_one(&mut *tx)
            .await?;
        if !owned {
            tracing::debug!("Expiry sweep skipped: lock held by another worker");
            tx.rollback().await?;
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, AttemptRow>(
            r#"
            UPDATE attempts
            SET status = 'expired', version = version + 1, updated_at = $1
            WHERE status = 'in_progress' AND expires_at < $1
            RETURNING *
            "#,
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        rows_to_attempts(rows)
    }

    async fn abandon_created_before(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Attempt>> {
        let rows = sqlx::query_as::<_, AttemptRow>(
            r#"
            UPDATE attempts
            SET status = 'abandoned', version = version + 1, updated_at = $2
            WHERE status = 'created' AND created_at < $1
            RETURNING *
            "#,
        )
        .bind(cutoff)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows_to_attempts(rows)
    }

    async fn status_distribution(&self) -> Result<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as(r#"SELECT status, COUNT(*) FROM attempts GROUP BY status"#)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }
}
