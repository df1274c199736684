//! Submission endpoint: the external collaborator that receives the
//! completed registration.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::model::FormData;
use crate::error::SubmissionError;

/// Response of a submission endpoint that accepted the data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<FormData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

/// Receives the accumulated `{account, location}` payload.
#[async_trait]
pub trait SubmissionEndpoint: Send + Sync {
    async fn submit(&self, data: &FormData) -> Result<SubmissionResponse, SubmissionError>;
}

/// Accepts every submission after a fixed delay.
pub struct SimulatedSubmission {
    delay: Duration,
}

impl SimulatedSubmission {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedSubmission {
    fn default() -> Self {
        Self::new(Duration::from_millis(2000))
    }
}

#[async_trait]
impl SubmissionEndpoint for SimulatedSubmission {
    async fn submit(&self, data: &FormData) -> Result<SubmissionResponse, SubmissionError> {
        tokio::time::sleep(self.delay).await;
        info!(
            username = data.account.as_ref().map(|a| a.username.as_str()).unwrap_or(""),
            country = data.location.as_ref().map(|l| l.country.as_str()).unwrap_or(""),
            "Simulated submission accepted"
        );
        Ok(SubmissionResponse {
            success: true,
            message: "Form submitted successfully!".to_string(),
            data: Some(data.clone()),
            errors: None,
        })
    }
}
