pub mod attempt_service;
pub mod extraction_service;
pub mod orchestrator;
pub mod question_bank;
pub mod queue_service;
pub mod scorer_client;
pub mod scoring_service;
