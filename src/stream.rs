//! Reassembling a server-sent-event solve stream.
//!
//! The reassembler is a push-driven state machine: it has no threads and no
//! blocking waits, and is driven entirely by the arrival of transport
//! chunks. Chunks may split SSE frames (and UTF-8 sequences) at arbitrary
//! byte boundaries, so we buffer bytes and only decode complete lines.
//!
//! Per solve call, the caller sees zero or more `Thinking`/`Content` deltas
//! in emission order, then exactly one terminal `Complete` or `Error`.
//! After the terminal event, further input is ignored, so the reassembler
//! is safe to discard mid-stream.

use chrono::Utc;
use serde_json::Value;

use crate::{
    decode,
    prelude::*,
    solve::{ProblemSolution, SolveMethod},
};

/// The literal end-of-stream sentinel.
const DONE_SENTINEL: &str = "[DONE]";

/// A progress notification emitted while a solve stream is consumed.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// A delta of the model's reasoning channel.
    Thinking(String),

    /// A delta of the model's answer channel.
    Content(String),

    /// Terminal: the stream completed and produced a solution.
    Complete(Box<ProblemSolution>),

    /// Terminal: the stream failed.
    Error(String),
}

/// Reassembler states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StreamState {
    Receiving,
    Completed,
    Failed,
}

/// The fields a finished solution is seeded with before any stream data
/// arrives. The id is the caller's to generate.
#[derive(Clone, Debug)]
pub struct SolutionSeed {
    pub id: String,
    pub expression: String,
    pub method: SolveMethod,
    pub model: String,
}

/// Reconstructs thinking/content channels from an SSE byte stream.
pub struct StreamReassembler {
    seed: SolutionSeed,
    state: StreamState,
    buffer: Vec<u8>,
    thinking: String,
    content: String,
}

impl StreamReassembler {
    /// Create a reassembler for one solve call.
    pub fn new(seed: SolutionSeed) -> Self {
        Self {
            seed,
            state: StreamState::Receiving,
            buffer: Vec::new(),
            thinking: String::new(),
            content: String::new(),
        }
    }

    /// Consume one transport chunk and return the events it produced.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        if self.state != StreamState::Receiving {
            return events;
        }
        self.buffer.extend_from_slice(chunk);

        // Process complete lines; hold back the trailing partial line (and
        // any partial UTF-8 sequence inside it) for the next chunk.
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            self.handle_line(line.trim(), &mut events);
            if self.state != StreamState::Receiving {
                break;
            }
        }
        events
    }

    /// Signal that the transport ended.
    ///
    /// Abrupt termination without a `[DONE]` or error sentinel is a failure;
    /// the caller must never be left waiting on a stream that already died.
    pub fn finish(&mut self) -> Vec<ProgressEvent> {
        if self.state != StreamState::Receiving {
            return Vec::new();
        }
        self.state = StreamState::Failed;
        vec![ProgressEvent::Error(
            "incomplete stream: transport ended before completion".to_owned(),
        )]
    }

    /// Handle one complete, trimmed line.
    fn handle_line(&mut self, line: &str, events: &mut Vec<ProgressEvent>) {
        let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
            // Blank keep-alive lines and non-data fields are ignored.
            return;
        };

        if payload == DONE_SENTINEL {
            self.state = StreamState::Completed;
            events.push(ProgressEvent::Complete(Box::new(self.finalize_solution())));
            return;
        }

        let frame: Value = match serde_json::from_str(payload) {
            Ok(frame) => frame,
            Err(err) => {
                // Flaky transports garble individual frames; skip them
                // without disturbing the state machine.
                warn!(%err, "skipping malformed stream frame");
                return;
            }
        };

        if let Some(message) = error_message(&frame) {
            self.state = StreamState::Failed;
            events.push(ProgressEvent::Error(message));
            return;
        }

        let delta = frame
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"));
        let Some(delta) = delta else {
            return;
        };
        if let Some(text) = delta.get("reasoning_content").and_then(Value::as_str) {
            if !text.is_empty() {
                self.thinking.push_str(text);
                events.push(ProgressEvent::Thinking(text.to_owned()));
            }
        }
        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            if !text.is_empty() {
                self.content.push_str(text);
                events.push(ProgressEvent::Content(text.to_owned()));
            }
        }
    }

    /// Build the final solution from the buffered content channel.
    fn finalize_solution(&self) -> ProblemSolution {
        let decoded = decode::decode(&self.content);
        ProblemSolution {
            id: self.seed.id.clone(),
            expression: self.seed.expression.clone(),
            steps: decoded.steps,
            result: decoded.final_answer,
            method: self.seed.method,
            explanation: self.content.clone(),
            problem_type: decode::problem_type(&self.seed.expression),
            difficulty: decode::difficulty(&self.seed.expression),
            model: Some(self.seed.model.clone()),
            thinking: if self.thinking.is_empty() {
                None
            } else {
                Some(self.thinking.clone())
            },
            timestamp: Utc::now(),
        }
    }
}

/// Extract an error message from an explicit in-stream error payload.
fn error_message(frame: &Value) -> Option<String> {
    match frame.get("error")? {
        Value::String(message) => Some(message.clone()),
        Value::Object(fields) => Some(
            fields
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("stream error")
                .to_owned(),
        ),
        _ => Some("stream error".to_owned()),
    }
}
