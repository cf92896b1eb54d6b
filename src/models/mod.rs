pub mod assessment;
pub mod attempt;
pub mod extraction;
pub mod question;
pub mod scoring;
