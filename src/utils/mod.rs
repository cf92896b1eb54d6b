pub mod seed;
pub mod time;
pub mod validation;
