//! Executing a single request against a single endpoint.
//!
//! The executor performs one buffered HTTP call and classifies the outcome
//! as success, retryable failure or fatal failure. The classification is the
//! load-bearing part: the orchestrator advances past retryable failures but
//! aborts the whole attempt sequence on a fatal one, so getting a status
//! code into the wrong bucket either wastes round trips or gives up on a
//! request that another endpoint could have served.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::{
    catalog::{Endpoint, Strategy},
    prelude::*,
};

/// The outcome of one (strategy, endpoint) execution.
#[derive(Clone, Debug)]
pub enum AttemptOutcome {
    /// The endpoint answered and we extracted raw model output.
    Success {
        /// Raw assistant content from the response envelope.
        raw_output: String,

        /// How long the call took.
        duration: Duration,
    },

    /// This attempt failed, but another strategy/endpoint combination may
    /// still work.
    Retryable {
        /// Human-readable reason.
        reason: String,

        /// The HTTP status, when the failure was an HTTP error.
        http_status: Option<StatusCode>,
    },

    /// No further combination can work; stop immediately. Credentials are
    /// never attempt-specific, so auth errors land here.
    Fatal {
        /// Human-readable reason.
        reason: String,
    },
}

/// Executes one attempt. A trait so the orchestrator can be driven by a
/// scripted stand-in under test.
#[async_trait]
pub trait AttemptExecutor: Send + Sync {
    /// Perform a single HTTP call and classify the outcome.
    async fn execute(
        &self,
        endpoint: &Endpoint,
        strategy: &Strategy,
        payload: &Value,
    ) -> AttemptOutcome;
}

/// The real, reqwest-backed executor.
#[derive(Debug)]
pub struct HttpExecutor {
    client: reqwest::Client,
    api_key: String,
    timeout: Duration,
}

impl HttpExecutor {
    /// Create an executor using `api_key` for Bearer auth and `timeout` as
    /// the per-attempt deadline.
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            timeout,
        }
    }
}

#[async_trait]
impl AttemptExecutor for HttpExecutor {
    #[instrument(level = "debug", skip_all, fields(endpoint = %endpoint.url, strategy = strategy.name))]
    async fn execute(
        &self,
        endpoint: &Endpoint,
        strategy: &Strategy,
        payload: &Value,
    ) -> AttemptOutcome {
        let started = Instant::now();

        // The deadline covers both the round trip and reading the body. A
        // timed-out future is dropped, which cancels the in-flight request.
        let request = async {
            let response = self
                .client
                .post(&endpoint.url)
                .bearer_auth(&self.api_key)
                .header("Accept", "application/json")
                .json(payload)
                .send()
                .await?;
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Ok::<_, reqwest::Error>((status, body))
        };
        let (status, body) = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                debug!("network error: {err}");
                return AttemptOutcome::Retryable {
                    reason: format!("network error: {err}"),
                    http_status: err.status(),
                };
            }
            Err(_) => {
                debug!("attempt timed out after {:?}", self.timeout);
                return AttemptOutcome::Retryable {
                    reason: format!("timeout after {}ms", self.timeout.as_millis()),
                    http_status: None,
                };
            }
        };

        if !status.is_success() {
            return classify_http_failure(status, &body);
        }

        let envelope: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(err) => {
                return AttemptOutcome::Retryable {
                    reason: format!("bad-shape: response is not JSON: {err}"),
                    http_status: Some(status),
                };
            }
        };
        match extract_raw_content(&envelope) {
            Some(raw_output) => AttemptOutcome::Success {
                raw_output,
                duration: started.elapsed(),
            },
            None => AttemptOutcome::Retryable {
                reason: "bad-shape: no assistant content in response envelope".to_owned(),
                http_status: Some(status),
            },
        }
    }
}

/// Classify a non-2xx response.
///
/// 401/403 are fatal: retrying with the same key cannot help. Everything
/// else, including malformed-request 4xx errors, is retryable, because a
/// bad request is usually specific to one strategy or endpoint rather than
/// account-wide.
fn classify_http_failure(status: StatusCode, body: &str) -> AttemptOutcome {
    let detail = extract_error_message(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AttemptOutcome::Fatal {
            reason: match detail {
                Some(detail) => format!("auth: HTTP {}: {}", status.as_u16(), detail),
                None => format!("auth: HTTP {}", status.as_u16()),
            },
        },
        StatusCode::TOO_MANY_REQUESTS => AttemptOutcome::Retryable {
            reason: "rate limited (HTTP 429)".to_owned(),
            http_status: Some(status),
        },
        status if status.is_server_error() => AttemptOutcome::Retryable {
            reason: format!("server error (HTTP {})", status.as_u16()),
            http_status: Some(status),
        },
        status => AttemptOutcome::Retryable {
            reason: match detail {
                Some(detail) => format!("HTTP {}: {}", status.as_u16(), detail),
                None => format!("HTTP {}", status.as_u16()),
            },
            http_status: Some(status),
        },
    }
}

/// Pull a provider error message out of an error body, if it is JSON.
fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let message = value
        .get("message")
        .or_else(|| value.get("error").and_then(|e| e.get("message")))
        .and_then(Value::as_str)?;
    match value.get("code").and_then(Value::as_str) {
        Some(code) => Some(format!("{message} (code: {code})")),
        None => Some(message.to_owned()),
    }
}

/// Extract the raw assistant content from a response envelope.
///
/// Providers and model versions disagree about the envelope shape, so we
/// try a small ordered set of matchers, each returning `Option`, instead of
/// one property chain that could miss:
///
/// 1. DashScope native: `output.choices[0].message.content` as a string.
/// 2. The same field as an array of parts (strings or `{text}` objects).
/// 3. The same field as an object with a `text` field.
/// 4. OpenAI-compatible: `choices[0].message.content` as a string.
pub fn extract_raw_content(envelope: &Value) -> Option<String> {
    let matchers: [fn(&Value) -> Option<String>; 4] = [
        |v| native_content(v)?.as_str().map(str::to_owned),
        |v| {
            let parts = native_content(v)?.as_array()?;
            let text = parts
                .iter()
                .map(|part| match part {
                    Value::String(s) => s.clone(),
                    other => other
                        .get("text")
                        .and_then(Value::as_str)
                        .map(str::to_owned)
                        .unwrap_or_else(|| other.to_string()),
                })
                .collect::<Vec<_>>()
                .join("");
            Some(text)
        },
        |v| {
            native_content(v)?
                .get("text")?
                .as_str()
                .map(str::to_owned)
        },
        |v| {
            v.get("choices")?
                .get(0)?
                .get("message")?
                .get("content")?
                .as_str()
                .map(str::to_owned)
        },
    ];
    matchers.iter().find_map(|matcher| matcher(envelope))
}

/// The `output.choices[0].message.content` field of a DashScope envelope.
fn native_content(envelope: &Value) -> Option<&Value> {
    envelope
        .get("output")?
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")
}
