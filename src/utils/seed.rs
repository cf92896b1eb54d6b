use crate::utils::time::truncate_to_minute;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Sampling seed for one attempt.
///
/// Stable for the same student, assessment, creation minute and attempt
/// number, so a resumed attempt re-derives the seed it was built with.
/// The attempt number separates retakes created within the same minute.
pub fn derive_seed(
    student_id: Uuid,
    assessment_id: Uuid,
    created_at: DateTime<Utc>,
    attempt_number: i32,
) -> u64 {
    let minute = truncate_to_minute(created_at).timestamp();

    let mut hasher = Sha256::new();
    hasher.update(student_id.as_bytes());
    hasher.update(assessment_id.as_bytes());
    hasher.update(minute.to_be_bytes());
    hasher.update(attempt_number.to_be_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}
