//! Evaluation report delivery
//!
//! Reports are POSTed as JSON and retried with exponential backoff until the
//! endpoint answers 200 or the attempt budget runs out.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::NotifierConfig;
use crate::task::{MaterializationResult, TaskEvent};
use crate::{Error, Result};

/// Body posted to the evaluation endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub repo_url: Option<String>,
    pub commit_sha: Option<String>,
    pub pages_url: Option<String>,
}

impl EvaluationReport {
    pub fn new(event: &TaskEvent, result: &MaterializationResult) -> Self {
        Self {
            email: event.email.clone(),
            task: event.task.clone(),
            round: event.round,
            nonce: event.nonce.clone(),
            repo_url: result.repository_url.clone(),
            commit_sha: result.commit_id.clone(),
            pages_url: result.publish_url.clone(),
        }
    }
}

/// Sends one report and returns the HTTP status code
#[async_trait]
pub trait ReportTransport: Send + Sync {
    async fn post(&self, endpoint: &url::Url, report: &EvaluationReport) -> Result<u16>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ReportTransport for HttpTransport {
    async fn post(&self, endpoint: &url::Url, report: &EvaluationReport) -> Result<u16> {
        let response = self
            .client
            .post(endpoint.clone())
            .json(report)
            .send()
            .await?;
        Ok(response.status().as_u16())
    }
}

/// Retry policy for report delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait after the first failure; doubled after each subsequent one
    pub initial_delay: Duration,
    /// Error out instead of returning `false` when attempts run out
    pub strict: bool,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, given `attempt` (1-based) just failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(1u32 << (attempt.saturating_sub(1)).min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&NotifierConfig::default())
    }
}

impl From<&NotifierConfig> for RetryPolicy {
    fn from(config: &NotifierConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_delay,
            strict: config.strict,
        }
    }
}

/// Delivers [`EvaluationReport`]s
pub struct Notifier {
    transport: Box<dyn ReportTransport>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Notifier {
    pub fn new(transport: Box<dyn ReportTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Notifier using HTTP with settings from `config`
    pub fn from_config(config: &NotifierConfig) -> Result<Self> {
        Ok(Self::new(
            Box::new(HttpTransport::new(config.timeout)?),
            RetryPolicy::from(config),
        ))
    }

    /// Post `report` to `endpoint` until it answers 200
    ///
    /// In lenient mode exhaustion yields `Ok(false)` and this never errors.
    /// In strict mode exhaustion yields [`Error::Notification`]. An unparsable
    /// endpoint counts as a failed attempt like any transport error.
    pub async fn notify(&self, endpoint: &str, report: &EvaluationReport) -> Result<bool> {
        let url = url::Url::parse(endpoint);
        let attempts = self.policy.max_attempts;
        let mut last_failure = String::new();

        for attempt in 1..=attempts {
            let sent = match &url {
                Ok(url) => self.transport.post(url, report).await,
                Err(e) => Err(Error::Notification(format!(
                    "Invalid evaluation URL '{}': {}",
                    endpoint, e
                ))),
            };

            match sent {
                Ok(200) => {
                    info!(task = %report.task, round = report.round, attempt, "Evaluation API notified");
                    return Ok(true);
                }
                Ok(status) => {
                    warn!(task = %report.task, attempt, status, "Evaluation API responded with non-200, retrying");
                    last_failure = format!("status {}", status);
                }
                Err(e) => {
                    warn!(task = %report.task, attempt, error = %e, "Error notifying evaluation API, retrying");
                    last_failure = e.to_string();
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.policy.delay_after(attempt)).await;
            }
        }

        self.give_up(format!(
            "Failed to notify {} after {} attempts (last: {})",
            endpoint, attempts, last_failure
        ))
    }

    fn give_up(&self, reason: String) -> Result<bool> {
        warn!(reason = %reason, "Giving up on evaluation notification");
        if self.policy.strict {
            Err(Error::Notification(reason))
        } else {
            Ok(false)
        }
    }
}
