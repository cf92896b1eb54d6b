pub mod attempt_dto;
pub mod scoring_dto;
