// ============================================================
// Layer 6 — EDA Validation Client
// ============================================================
// Blocking HTTP client for the remote design validator.
//
//   POST <endpoint>
//   Authorization: Bearer $EDA_API_KEY
//   { "design_note": "...", "recommendation": "...",
//     "metrics": ["power", "area", "timing"] }
//
//   200 → { "metrics": { "power": .., "area": .., "timing": .. } }
//
// Transport errors and 5xx / 429 responses are retried with
// exponential backoff; anything still failing after the last
// attempt is RemoteUnavailable. The client never substitutes the
// fallback itself: that happens at the enrichment call site.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{error::PipelineError, records::EdaMetrics, traits::DesignValidator};

pub const DEFAULT_ENDPOINT: &str = "https://api.synopsys.com/design-compiler/validate";
pub const API_KEY_VAR: &str = "EDA_API_KEY";
/// Still honoured when `EDA_API_KEY` is unset.
pub const LEGACY_API_KEY_VAR: &str = "SYNOPSYS_API_KEY";
const REQUESTED_METRICS: [&str; 3] = ["power", "area", "timing"];

/// Retry settings for the validator call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts including the first one.
    pub max_attempts: usize,
    pub base_delay:   Duration,
    pub max_delay:    Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay:   Duration::from_millis(250),
            max_delay:    Duration::from_secs(4),
        }
    }
}

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    design_note:    &'a str,
    recommendation: &'a str,
    metrics:        [&'a str; 3],
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    metrics: EdaMetrics,
}

enum Attempt {
    Retryable(String),
    Fatal(String),
}

impl Attempt {
    fn reason(self) -> String {
        match self {
            Self::Retryable(r) | Self::Fatal(r) => r,
        }
    }
}

pub struct EdaClient {
    agent:    ureq::Agent,
    endpoint: String,
    api_key:  Option<String>,
    retry:    RetryConfig,
}

/// First non-empty key among `EDA_API_KEY` and `SYNOPSYS_API_KEY`.
fn api_key_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    [API_KEY_VAR, LEGACY_API_KEY_VAR]
        .into_iter()
        .find_map(|name| lookup(name).filter(|k| !k.is_empty()))
}

impl EdaClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, retry: RetryConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self {
            agent,
            endpoint: endpoint.into(),
            api_key: api_key_from(|name| std::env::var(name).ok()),
            retry,
        }
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    fn attempt(&self, body: &ValidateRequest<'_>) -> Result<EdaMetrics, Attempt> {
        let mut request = self.agent.post(&self.endpoint).set("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }

        match request.send_json(body) {
            Ok(response) => response
                .into_json::<ValidateResponse>()
                .map(|r| r.metrics)
                .map_err(|e| Attempt::Fatal(format!("invalid response body: {e}"))),
            Err(ureq::Error::Status(code, _)) if code == 429 || code >= 500 => {
                Err(Attempt::Retryable(format!("HTTP {code}")))
            }
            Err(ureq::Error::Status(code, _)) => Err(Attempt::Fatal(format!("HTTP {code}"))),
            Err(ureq::Error::Transport(t)) => Err(Attempt::Retryable(t.to_string())),
        }
    }
}

impl DesignValidator for EdaClient {
    fn validate(&self, note_text: &str, recommendation: &str) -> Result<EdaMetrics, PipelineError> {
        let body = ValidateRequest { design_note: note_text, recommendation, metrics: REQUESTED_METRICS };
        retry_with_backoff(
            self.retry,
            || self.attempt(&body),
            |e| matches!(e, Attempt::Retryable(_)),
        )
        .map_err(|e| PipelineError::RemoteUnavailable { reason: e.reason() })
    }
}

/// Run `action` until it succeeds, `should_retry` says stop, or the
/// attempt budget is spent.
pub fn retry_with_backoff<T, E, F, R>(config: RetryConfig, mut action: F, mut should_retry: R) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    R: FnMut(&E) -> bool,
{
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match action() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= config.max_attempts || !should_retry(&err) {
                    return Err(err);
                }
                let delay = backoff_delay(config.base_delay, config.max_delay, attempt);
                tracing::debug!("Validator attempt {attempt} failed, retrying in {delay:?}");
                std::thread::sleep(delay);
            }
        }
    }
}

fn backoff_delay(base: Duration, max: Duration, attempt: usize) -> Duration {
    let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    let factor   = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}
