pub mod attempt_store;
pub mod definition_repo;
pub mod memory;
pub mod pg_attempt_store;
pub mod pg_scoring_queue;
pub mod pool;
pub mod scoring_queue;

pub use attempt_store::AttemptStore;
pub use definition_repo::DefinitionSource;
pub use scoring_queue::{ScoringJob, ScoringQueue};
