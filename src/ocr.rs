//! Recognizing a math expression from an image.
//!
//! Recognition is deliberately total: `recognize` always returns an
//! `OcrResult`. When every attempt fails, the result carries a readable
//! error summary plus suggestions instead of a transport error, so the
//! caller can always show the user something actionable.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::{
    catalog::{self, Operation, Strategy, Transport},
    config::ApiConfig,
    data_url,
    decode::{self, Decoded},
    executor::HttpExecutor,
    orchestrator::{AttemptFailure, LoopOrder, Orchestrator},
    prelude::*,
    quality::{self, ImageQuality},
};

/// Minimum accepted base64 payload length, in characters.
const MIN_BASE64_LEN: usize = 100;

/// Maximum accepted base64 payload length, in characters.
const MAX_BASE64_LEN: usize = 2_000_000;

/// Located region of recognized text.
///
/// The vision models we call do not return regions today; the field exists
/// so results keep their shape when one does.
#[derive(Clone, Debug, Serialize)]
pub struct BoundingBox {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f32,
}

/// The outcome of recognizing one image.
#[derive(Clone, Debug, Serialize)]
pub struct OcrResult {
    /// The full recognized text.
    pub text: String,

    /// The math expression extracted from the text.
    pub math_expression: String,

    /// Confidence in the recognition, 0.1 to 0.99, or 0.0 on failure.
    pub confidence: f32,

    /// Located regions, when the model provides them.
    pub bounding_boxes: Vec<BoundingBox>,

    /// LaTeX form of the expression, when one was extracted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latex: Option<String>,

    /// Why recognition failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// The model that produced the text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// The strategy that produced the text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,

    /// Quality analysis of the submitted image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_quality: Option<ImageQuality>,

    /// Actionable advice, populated on failure.
    pub suggestions: Vec<String>,

    pub timestamp: DateTime<Utc>,
}

/// An input image in either raw or base64 form.
#[derive(Clone, Debug)]
pub enum ImageData {
    Bytes(Vec<u8>),
    Base64(String),
}

/// Recognizes math expressions via the vision endpoints.
pub struct Recognizer {
    config: ApiConfig,
    executor: HttpExecutor,
    loop_order: LoopOrder,
}

impl Recognizer {
    pub fn new(config: ApiConfig, loop_order: LoopOrder) -> Self {
        let executor = HttpExecutor::new(config.api_key.clone(), config.timeout);
        Self {
            config,
            executor,
            loop_order,
        }
    }

    /// Recognize the math expression in `image`.
    ///
    /// Invalid input and exhausted attempts both produce a failure result,
    /// never an `Err`.
    #[instrument(skip_all)]
    pub async fn recognize(&self, image: ImageData) -> OcrResult {
        let (clean, bytes) = match normalize_image(image) {
            Ok(pair) => pair,
            Err(message) => return failure_result(message, None),
        };
        if clean.len() < MIN_BASE64_LEN {
            return failure_result(
                format!(
                    "image data is too short ({} base64 characters); it is probably not a real photo",
                    clean.len()
                ),
                None,
            );
        }
        if clean.len() > MAX_BASE64_LEN {
            return failure_result(
                format!(
                    "image data is too large ({} base64 characters); resize the photo before uploading",
                    clean.len()
                ),
                None,
            );
        }

        let quality = quality::score_image_quality(bytes.len() as u64);
        let mime = data_url::detect_image_mime(&bytes);
        let url = data_url::data_url(mime, &clean);
        info!(
            size = bytes.len(),
            mime,
            quality_score = quality.score,
            "starting recognition"
        );

        let strategies = catalog::strategies(Operation::VisionRecognition);
        // The executor buffers whole responses, so streaming endpoints are
        // not usable here.
        let endpoints: Vec<_> =
            catalog::endpoints(Operation::VisionRecognition, &self.config)
                .into_iter()
                .filter(|e| e.transport == Transport::BufferedJson)
                .collect();
        let orchestrator = Orchestrator::new(&self.executor, self.loop_order);
        let outcome = orchestrator
            .attempt(&strategies, &endpoints, |strategy| {
                vision_payload(strategy, &url)
            })
            .await;

        match outcome {
            Ok(success) => {
                info!(
                    strategy = %success.strategy,
                    endpoint = %success.endpoint,
                    duration_ms = success.duration.as_millis() as u64,
                    "recognition succeeded"
                );
                let decoded = decode::decode(&success.raw_output);
                let confidence =
                    quality::score_confidence(&decoded.math_expression, &quality);
                let model = strategies
                    .iter()
                    .find(|s| s.name == success.strategy)
                    .map(|s| s.model_id.to_owned())
                    .unwrap_or_default();
                success_result(
                    success.raw_output,
                    decoded,
                    confidence,
                    success.strategy,
                    model,
                    quality,
                )
            }
            Err(failure) => {
                let summary = failure_summary(&failure);
                let hints = quality::suggestions_for(&quality, Some(&failure.reason));
                let mut result = failure_result(summary, Some(quality));
                result.suggestions = hints.details;
                if !hints.summary.is_empty() {
                    result.suggestions.insert(0, hints.summary);
                }
                result
            }
        }
    }
}

/// Strip any data-URL prefix, scrub stray characters and decode.
fn normalize_image(image: ImageData) -> std::result::Result<(String, Vec<u8>), String> {
    match image {
        ImageData::Bytes(bytes) => {
            let clean = data_url::encode_base64(&bytes);
            Ok((clean, bytes))
        }
        ImageData::Base64(raw) => {
            let clean = data_url::clean_base64(data_url::strip_data_url_prefix(&raw));
            let bytes = data_url::decode_base64(&clean).map_err(|err| format!("{err:#}"))?;
            Ok((clean, bytes))
        }
    }
}

/// Build the native vision request body for one strategy.
fn vision_payload(strategy: &Strategy, image_url: &str) -> serde_json::Value {
    json!({
        "model": strategy.model_id,
        "input": {
            "messages": [{
                "role": "user",
                "content": [
                    { "image": image_url },
                    { "text": strategy.prompt_template },
                ],
            }],
        },
        "parameters": {
            "result_format": "message",
            "max_tokens": strategy.max_tokens,
            "incremental_output": false,
            "enable_search": false,
        },
    })
}

fn success_result(
    text: String,
    decoded: Decoded,
    confidence: f32,
    strategy: String,
    model: String,
    quality: ImageQuality,
) -> OcrResult {
    OcrResult {
        text,
        latex: Some(decoded.math_expression.clone()),
        math_expression: decoded.math_expression,
        confidence,
        bounding_boxes: Vec::new(),
        error: None,
        model: Some(model),
        strategy: Some(strategy),
        image_quality: Some(quality),
        suggestions: Vec::new(),
        timestamp: Utc::now(),
    }
}

fn failure_result(error: String, quality: Option<ImageQuality>) -> OcrResult {
    OcrResult {
        text: String::new(),
        math_expression: String::new(),
        confidence: 0.0,
        bounding_boxes: Vec::new(),
        latex: None,
        error: Some(error),
        model: None,
        strategy: None,
        image_quality: quality,
        suggestions: Vec::new(),
        timestamp: Utc::now(),
    }
}

/// Turn a structured failure into something a user can act on.
fn failure_summary(failure: &AttemptFailure) -> String {
    if failure.fatal {
        return "authentication failed: check your API credentials".to_owned();
    }
    match failure.http_status {
        Some(status) if status.as_u16() == 429 => {
            "the service is rate limiting requests; wait a moment and retry".to_owned()
        }
        Some(status) if status.is_server_error() => {
            "the recognition service is temporarily unavailable".to_owned()
        }
        _ if failure.reason.contains("timeout") => {
            "the recognition request timed out; check your network and retry".to_owned()
        }
        _ => format!(
            "recognition failed after {} attempts: {}",
            failure.attempts, failure.reason
        ),
    }
}
