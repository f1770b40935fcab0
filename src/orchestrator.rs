//! Driving the strategy × endpoint product until something works.
//!
//! Attempts run strictly sequentially: we trade latency for simplicity and
//! for staying inside third-party rate limits. Worst-case latency is
//! bounded by (strategies × endpoints) round trips, each individually
//! bounded by the executor's deadline, and the caller always gets a
//! structured result back, never an unhandled error.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

use crate::{
    catalog::{Endpoint, Strategy},
    executor::{AttemptExecutor, AttemptOutcome},
    prelude::*,
};

/// Which dimension the outer loop iterates.
///
/// The choice only affects which dimension is exhausted first. We default to
/// trying every endpoint for one strategy before moving to the next
/// strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopOrder {
    /// Outer loop over strategies, inner loop over endpoints.
    #[default]
    StrategyMajor,

    /// Outer loop over endpoints, inner loop over strategies.
    EndpointMajor,
}

/// A usable result from the first successful attempt.
#[derive(Clone, Debug)]
pub struct AttemptSuccess {
    /// Raw model output, guaranteed non-blank.
    pub raw_output: String,

    /// Name of the strategy that produced it.
    pub strategy: String,

    /// URL of the endpoint that served it.
    pub endpoint: String,

    /// Duration of the winning call.
    pub duration: Duration,
}

/// The structured failure returned when no combination produced a usable
/// result.
#[derive(Clone, Debug)]
pub struct AttemptFailure {
    /// True when a fatal error cut the sequence short.
    pub fatal: bool,

    /// The fatal reason, or the most recent retryable reason.
    pub reason: String,

    /// HTTP status of the failure we are reporting, if any.
    pub http_status: Option<StatusCode>,

    /// How many attempts actually ran.
    pub attempts: usize,
}

/// Runs the fallback sequence for one logical request.
pub struct Orchestrator<'a> {
    executor: &'a dyn AttemptExecutor,
    loop_order: LoopOrder,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator over `executor`.
    pub fn new(executor: &'a dyn AttemptExecutor, loop_order: LoopOrder) -> Self {
        Self {
            executor,
            loop_order,
        }
    }

    /// Try every (strategy, endpoint) combination in order until one yields
    /// non-blank output.
    ///
    /// A blank success is treated as retryable: the model answered but said
    /// nothing useful, and another combination may do better. A fatal
    /// failure aborts every remaining combination immediately.
    #[instrument(level = "debug", skip_all)]
    pub async fn attempt(
        &self,
        strategies: &[Strategy],
        endpoints: &[Endpoint],
        build_payload: impl Fn(&Strategy) -> Value,
    ) -> Result<AttemptSuccess, AttemptFailure> {
        let mut last_reason = "no strategy/endpoint combinations configured".to_owned();
        let mut last_status = None;
        let mut attempts = 0;

        for (strategy, endpoint) in combinations(self.loop_order, strategies, endpoints) {
            attempts += 1;
            debug!(
                strategy = strategy.name,
                endpoint = %endpoint.url,
                "attempting recognition"
            );
            let payload = build_payload(strategy);
            match self.executor.execute(endpoint, strategy, &payload).await {
                AttemptOutcome::Success {
                    raw_output,
                    duration,
                } => {
                    if raw_output.trim().is_empty() {
                        debug!(strategy = strategy.name, "empty output, continuing");
                        last_reason = "model returned empty output".to_owned();
                        last_status = None;
                        continue;
                    }
                    info!(
                        strategy = strategy.name,
                        endpoint = %endpoint.url,
                        duration_ms = duration.as_millis() as u64,
                        "attempt succeeded"
                    );
                    return Ok(AttemptSuccess {
                        raw_output,
                        strategy: strategy.name.to_owned(),
                        endpoint: endpoint.url.clone(),
                        duration,
                    });
                }
                AttemptOutcome::Retryable {
                    reason,
                    http_status,
                } => {
                    debug!(strategy = strategy.name, %reason, "retryable failure");
                    last_reason = reason;
                    last_status = http_status;
                }
                AttemptOutcome::Fatal { reason } => {
                    warn!(%reason, "fatal failure, aborting remaining attempts");
                    return Err(AttemptFailure {
                        fatal: true,
                        reason,
                        http_status: None,
                        attempts,
                    });
                }
            }
        }

        warn!(attempts, reason = %last_reason, "all attempts exhausted");
        Err(AttemptFailure {
            fatal: false,
            reason: last_reason,
            http_status: last_status,
            attempts,
        })
    }
}

/// All (strategy, endpoint) pairs in the configured iteration order.
fn combinations<'s>(
    loop_order: LoopOrder,
    strategies: &'s [Strategy],
    endpoints: &'s [Endpoint],
) -> Vec<(&'s Strategy, &'s Endpoint)> {
    match loop_order {
        LoopOrder::StrategyMajor => strategies
            .iter()
            .flat_map(|s| endpoints.iter().map(move |e| (s, e)))
            .collect(),
        LoopOrder::EndpointMajor => endpoints
            .iter()
            .flat_map(|e| strategies.iter().map(move |s| (s, e)))
            .collect(),
    }
}
