//! HTTP readiness probe for application containers.

use std::time::Duration;

use packtest_common::config::ReadinessPolicy;
use packtest_common::constants::PROBE_REQUEST_TIMEOUT_MS;
use packtest_common::error::{PacktestError, Result};
use serde::Serialize;
use thiserror::Error;

/// Why a probe did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ProbeFailure {
    /// Nothing answered within the retry budget.
    #[error("{url} not ready after {attempts} attempts: {last_error}")]
    NotReady {
        /// Probed URL.
        url: String,
        /// Attempts made.
        attempts: u32,
        /// Error from the last attempt.
        last_error: String,
    },

    /// The application answered with a non-success status.
    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        /// Probed URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
}

/// Probes a URL with bounded, exponentially backed-off retries.
///
/// Connection-level errors are retried because the application may still
/// be starting. Any HTTP response ends the probe: success statuses pass,
/// everything else is a [`ProbeFailure::Status`].
#[derive(Debug, Clone)]
pub struct Prober {
    client: reqwest::blocking::Client,
    policy: ReadinessPolicy,
}

impl Prober {
    /// Creates a prober with the given retry policy.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the HTTP client cannot be built.
    pub fn new(policy: ReadinessPolicy) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(PROBE_REQUEST_TIMEOUT_MS))
            .build()
            .map_err(|e| PacktestError::execution(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, policy })
    }

    /// Waits for `url` to answer and returns the response body.
    ///
    /// # Errors
    ///
    /// Returns a [`ProbeFailure`] once the retry budget is exhausted or the
    /// application answers with a non-success status.
    pub fn probe(&self, url: &str) -> std::result::Result<String, ProbeFailure> {
        let attempts = self.policy.attempts.max(1);
        let mut last_error = String::new();
        for attempt in 0..attempts {
            if attempt > 0 {
                std::thread::sleep(self.policy.backoff(attempt - 1));
            }
            match self.client.get(url).send() {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().unwrap_or_default();
                    if status.is_success() {
                        tracing::debug!(url, attempt, "probe succeeded");
                        return Ok(body);
                    }
                    return Err(ProbeFailure::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                        body: truncate(&body, 512),
                    });
                }
                Err(e) => {
                    tracing::debug!(url, attempt, error = %e, "probe attempt failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(ProbeFailure::NotReady {
            url: url.to_string(),
            attempts,
            last_error,
        })
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
