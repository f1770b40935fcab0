//! Solving a math expression over the streaming chat endpoint.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::bail;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    catalog::{self, Operation, Strategy, Transport},
    config::ApiConfig,
    decode::{Difficulty, ProblemType},
    prelude::*,
    stream::{ProgressEvent, SolutionSeed, StreamReassembler},
};

/// The system role prepended to every solve conversation.
const SYSTEM_PROMPT: &str = "你是一个专业的数学解题助手，擅长解决各种数学问题。请提供详细、准确的解题过程。";

/// How the model is asked to work through the problem.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SolveMethod {
    /// Let the model reason in a dedicated thinking channel first.
    #[default]
    Thinking,
    /// Chain-of-thought: reason step by step in the answer itself.
    Cot,
    /// Tool-integrated reasoning: interleave reasoning with computation.
    Tir,
}

impl SolveMethod {
    /// The strategy name this method selects from the catalog.
    pub fn strategy_name(self) -> &'static str {
        match self {
            SolveMethod::Thinking => "thinking",
            SolveMethod::Cot => "cot",
            SolveMethod::Tir => "tir",
        }
    }
}

impl std::fmt::Display for SolveMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.strategy_name())
    }
}

/// A fully decoded solution for one expression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProblemSolution {
    pub id: String,
    pub expression: String,
    pub steps: Vec<String>,
    pub result: String,
    pub method: SolveMethod,
    pub explanation: String,
    #[serde(rename = "type")]
    pub problem_type: ProblemType,
    pub difficulty: Difficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Solves expressions against the streaming completion endpoints.
pub struct Solver {
    config: ApiConfig,
    client: reqwest::Client,
}

impl Solver {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Solve `expression`, forwarding progress to `on_progress` as the
    /// stream arrives. Returns the final decoded solution.
    #[instrument(skip_all, fields(method = %method))]
    pub async fn solve(
        &self,
        expression: &str,
        method: SolveMethod,
        mut on_progress: impl FnMut(&ProgressEvent),
    ) -> Result<ProblemSolution> {
        let expression = expression.trim();
        if expression.is_empty() {
            bail!("expression must not be empty");
        }

        let strategies = catalog::strategies(Operation::TextCompletion);
        let strategy = strategies
            .iter()
            .find(|s| s.name == method.strategy_name())
            .context("no strategy registered for solve method")?;

        let prompt = render_prompt(strategy, expression)?;
        let body = json!({
            "model": strategy.model_id,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "stream": true,
            "enable_thinking": method == SolveMethod::Thinking,
            "enable_search": false,
            "max_tokens": strategy.max_tokens,
        });

        let endpoints = catalog::endpoints(Operation::TextCompletion, &self.config);
        let mut last_failure = String::from("no streaming endpoints configured");

        // Only event-stream endpoints can feed the reassembler.
        let streaming_endpoints = endpoints
            .iter()
            .filter(|e| e.transport == Transport::EventStream);
        for endpoint in streaming_endpoints {
            debug!(url = %endpoint.url, "starting solve stream");
            let seed = SolutionSeed {
                id: new_problem_id(),
                expression: expression.to_owned(),
                method,
                model: strategy.model_id.to_owned(),
            };

            // The deadline covers connection and response headers only;
            // once the stream is open, data keeps its own pace.
            let request = self
                .client
                .post(&endpoint.url)
                .bearer_auth(&self.config.api_key)
                .header("Accept", "text/event-stream")
                .json(&body)
                .send();
            let response = match tokio::time::timeout(self.config.timeout, request).await
            {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => {
                    warn!(url = %endpoint.url, %err, "solve request failed");
                    last_failure = format!("network error: {err}");
                    continue;
                }
                Err(_) => {
                    warn!(url = %endpoint.url, "solve request timed out");
                    last_failure =
                        format!("timeout after {}ms", self.config.timeout.as_millis());
                    continue;
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                bail!(
                    "authentication failed (HTTP {status}): check DASHSCOPE_API_KEY"
                );
            }
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                warn!(url = %endpoint.url, %status, "solve endpoint rejected request");
                last_failure = format!("HTTP {status}: {}", detail.trim());
                continue;
            }

            match consume_stream(response, seed, &mut on_progress).await {
                Ok(solution) => return Ok(solution),
                Err(reason) => {
                    warn!(url = %endpoint.url, %reason, "solve stream failed");
                    // The sink has already seen a terminal Error for this
                    // call; trying another endpoint would emit deltas
                    // after it.
                    bail!("solve stream failed: {reason}");
                }
            }
        }

        bail!("all solve endpoints failed: {last_failure}")
    }
}

/// Drive one open response stream through the reassembler.
async fn consume_stream(
    response: reqwest::Response,
    seed: SolutionSeed,
    on_progress: &mut impl FnMut(&ProgressEvent),
) -> std::result::Result<ProblemSolution, String> {
    drive_stream(response.bytes_stream(), seed, on_progress).await
}

/// Feed chunks into the reassembler until a terminal event arrives.
///
/// Whatever happens to the transport, `on_progress` sees exactly one
/// terminal event per call.
async fn drive_stream<S, B, E>(
    mut body: S,
    seed: SolutionSeed,
    on_progress: &mut impl FnMut(&ProgressEvent),
) -> std::result::Result<ProblemSolution, String>
where
    S: futures::Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut reassembler = StreamReassembler::new(seed);

    let mut handle = |events: Vec<ProgressEvent>| -> Option<
        std::result::Result<ProblemSolution, String>,
    > {
        for event in events {
            on_progress(&event);
            match event {
                ProgressEvent::Complete(solution) => return Some(Ok(*solution)),
                ProgressEvent::Error(message) => return Some(Err(message)),
                _ => {}
            }
        }
        None
    };

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                // The transport died mid-stream; the sink still needs its
                // terminal event before we report the cause.
                handle(reassembler.finish());
                return Err(format!("stream transport error: {err}"));
            }
        };
        if let Some(outcome) = handle(reassembler.push(chunk.as_ref())) {
            return outcome;
        }
    }
    match handle(reassembler.finish()) {
        Some(outcome) => outcome,
        None => Err("stream ended without a terminal event".to_owned()),
    }
}

/// Render a strategy's prompt template with the expression substituted.
fn render_prompt(strategy: &Strategy, expression: &str) -> Result<String> {
    let mut registry = handlebars::Handlebars::new();
    registry.set_strict_mode(true);
    registry
        .render_template(
            strategy.prompt_template,
            &json!({ "expression": expression }),
        )
        .context("failed to render solve prompt")
}

/// A fresh history-stable problem id.
fn new_problem_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix: String = Uuid::new_v4().simple().to_string()[..8].to_owned();
    format!("problem_{millis}_{suffix}")
}
