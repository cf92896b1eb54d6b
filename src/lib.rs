pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::Config;
use crate::database::definition_repo::DefinitionRepository;
use crate::database::memory::{MemoryAttemptStore, MemoryDefinitions, MemoryScoringQueue};
use crate::database::pg_attempt_store::PgAttemptStore;
use crate::database::pg_scoring_queue::PgScoringQueue;
use crate::database::{AttemptStore, DefinitionSource, ScoringQueue};
use crate::error::Result;
use crate::services::{
    attempt_service::AttemptService, orchestrator::Orchestrator, queue_service::ScoringWorker,
    scorer_client::{HttpScorer, ScoringCollaborator}, scoring_service::ScoringService,
};
use crate::utils::time::{Clock, SystemClock};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub attempt_service: AttemptService,
    pub scoring_service: ScoringService,
    pub orchestrator: Orchestrator,
    pub scoring_worker: ScoringWorker,
}

impl AppState {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        queue: Arc<dyn ScoringQueue>,
        definitions: Arc<dyn DefinitionSource>,
        scorer: Arc<dyn ScoringCollaborator>,
        clock: Arc<dyn Clock>,
        scoring_max_attempts: i32,
    ) -> Self {
        let attempt_service = AttemptService::new(store, clock.clone());
        let scoring_service = ScoringService::new(attempt_service.clone());
        let orchestrator = Orchestrator::new(
            attempt_service.clone(),
            scoring_service.clone(),
            queue.clone(),
            definitions,
        );
        let scoring_worker = ScoringWorker::new(
            queue,
            scorer,
            scoring_service.clone(),
            clock,
            scoring_max_attempts,
        );

        Self {
            attempt_service,
            scoring_service,
            orchestrator,
            scoring_worker,
        }
    }

    /// Postgres-backed wiring used by the worker binary.
    pub fn from_pool(pool: PgPool, config: &Config) -> Result<Self> {
        let scorer = HttpScorer::new(
            config.scorer_url.clone(),
            config.scorer_secret.clone(),
            Duration::from_secs(config.scorer_timeout_secs),
        )?;
        Ok(Self::new(
            Arc::new(PgAttemptStore::new(pool.clone())),
            Arc::new(PgScoringQueue::new(pool.clone())),
            Arc::new(DefinitionRepository::new(pool)),
            Arc::new(scorer),
            Arc::new(SystemClock),
            config.scoring_max_attempts,
        ))
    }

    /// Single-process wiring over the in-memory stores.
    pub fn in_memory(
        store: Arc<MemoryAttemptStore>,
        queue: Arc<MemoryScoringQueue>,
        definitions: Arc<MemoryDefinitions>,
        scorer: Arc<dyn ScoringCollaborator>,
        clock: Arc<dyn Clock>,
        scoring_max_attempts: i32,
    ) -> Self {
        Self::new(store, queue, definitions, scorer, clock, scoring_max_attempts)
    }
}
