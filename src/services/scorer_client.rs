use crate::dto::scoring_dto::{ScoringCallback, ScoringRequest};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// The external grader. It may answer synchronously with a full or partial
/// result, or just accept the request and call back later.
#[async_trait]
pub trait ScoringCollaborator: Send + Sync {
    async fn request_scoring(&self, request: &ScoringRequest) -> Result<Option<ScoringCallback>>;
}

#[derive(Clone)]
pub struct HttpScorer {
    client: Client,
    target_url: String,
    secret: String,
}

impl HttpScorer {
    pub fn new(target_url: String, secret: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            target_url,
            secret,
        })
    }
}

#[async_trait]
impl ScoringCollaborator for HttpScorer {
    async fn request_scoring(&self, request: &ScoringRequest) -> Result<Option<ScoringCallback>> {
        let resp = self
            .client
            .post(&self.target_url)
            .header("X-Scorer-Secret", &self.secret)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(Error::Internal(format!(
                "scorer responded {}: {}",
                status.as_u16(),
                body.chars().take(500).collect::<String>()
            )));
        }

        // 202 or an empty/non-result body means the result comes by callback.
        if body.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<ScoringCallback>(&body) {
            Ok(callback) => Ok(Some(callback)),
            Err(err) => {
                tracing::debug!(
                    attempt_id = %request.attempt_id,
                    error = %err,
                    "Scorer accepted request without an inline result"
                );
                Ok(None)
            }
        }
    }
}
