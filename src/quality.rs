//! Image-quality and confidence scoring.
//!
//! These are deterministic, I/O-free annotations. They enrich results and
//! failure responses for the user; they never gate the success/failure
//! decisions made by the orchestrator.

use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::Serialize;

static LATEX_COMMAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[a-zA-Z]+").expect("static regex"));

/// Size bucket for an uploaded image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeCategory {
    TooSmall,
    Small,
    Medium,
    Large,
    Oversized,
}

impl fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SizeCategory::TooSmall => "too small",
            SizeCategory::Small => "small",
            SizeCategory::Medium => "medium",
            SizeCategory::Large => "large",
            SizeCategory::Oversized => "oversized",
        };
        write!(f, "{s}")
    }
}

/// Resolution estimated from the byte size alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatedResolution {
    Low,
    Medium,
    High,
}

/// What we can guess about an image before sending it anywhere.
#[derive(Clone, Debug, Serialize)]
pub struct ImageQuality {
    /// Decoded size in bytes.
    pub size: u64,

    /// Size bucket.
    pub category: SizeCategory,

    /// Resolution estimated from the byte size.
    pub estimated_resolution: EstimatedResolution,

    /// Weighted quality score; higher is better.
    pub score: u32,

    /// Human-readable issues spotted during analysis.
    pub issues: Vec<String>,
}

/// Score the quality of an image from its decoded byte size.
pub fn score_image_quality(byte_size: u64) -> ImageQuality {
    let mut issues = Vec::new();

    let (category, score) = if byte_size < 10_000 {
        issues.push("image file is very small and may lack resolution".to_owned());
        (SizeCategory::TooSmall, 1)
    } else if byte_size < 100_000 {
        issues.push("image file is small; a higher resolution would help".to_owned());
        (SizeCategory::Small, 3)
    } else if byte_size < 2_000_000 {
        (SizeCategory::Medium, 5)
    } else if byte_size < 5_000_000 {
        (SizeCategory::Large, 4)
    } else {
        issues.push("image file is very large and may slow processing".to_owned());
        (SizeCategory::Oversized, 2)
    };

    // Rough pixel estimate, assuming ~3 bytes per pixel.
    let estimated_pixels = byte_size / 3;
    let estimated_resolution = if estimated_pixels < 100_000 {
        issues.push("estimated resolution is low and may hurt recognition".to_owned());
        EstimatedResolution::Low
    } else if estimated_pixels < 500_000 {
        EstimatedResolution::Medium
    } else {
        EstimatedResolution::High
    };

    ImageQuality {
        size: byte_size,
        category,
        estimated_resolution,
        score,
        issues,
    }
}

/// Score how much we trust a recognized text, in [0, 1].
///
/// Monotonic in text length up to the bonus threshold: longer recognized
/// text never lowers the score, all else equal.
pub fn score_confidence(text: &str, quality: &ImageQuality) -> f32 {
    let mut confidence: f32 = 0.8;

    let length = text.chars().count();
    if length > 50 {
        confidence += 0.1;
    }
    if length < 5 {
        confidence -= 0.3;
    }

    confidence += (quality.score as f32 / 5.0) * 0.2;

    if text.contains(['+', '-', '*', '/', '=', '(', ')']) {
        confidence += 0.05;
    }
    // LaTeX commands suggest the model actually saw structured math.
    if LATEX_COMMAND_RE.is_match(text) {
        confidence += 0.05;
    }

    confidence.clamp(0.1, 0.99)
}

/// Actionable advice generated for a failed recognition.
#[derive(Clone, Debug, Serialize)]
pub struct Suggestions {
    /// One-line summary of the most likely cause.
    pub summary: String,

    /// Concrete things the user can try.
    pub details: Vec<String>,
}

/// Build user-facing suggestions from the image quality and the last error
/// we saw, if any.
pub fn suggestions_for(quality: &ImageQuality, last_error: Option<&str>) -> Suggestions {
    let mut summary = String::new();
    let mut details = Vec::new();

    if quality.score < 3 {
        summary = "image quality may be insufficient".to_owned();
        details.push("retake with a higher-resolution image".to_owned());
        details.push("make sure the photo is sharp and well lit".to_owned());
        details.push("shoot straight on rather than at an angle".to_owned());
    }

    if quality.size < 50_000 {
        details.push("the image file is too small; retake a higher-quality photo".to_owned());
    }

    if let Some(error) = last_error {
        if error.contains("download the media resource") {
            summary = "the image format may be the problem".to_owned();
            details.push("convert the image to JPG or PNG".to_owned());
            details.push("make sure the image file is not corrupted".to_owned());
        }
    }

    if details.is_empty() {
        summary = "a complex formula may be hard to recognize".to_owned();
        details.push("photograph complex formulas in smaller sections".to_owned());
        details.push("keep handwriting clear and evenly spaced".to_owned());
        details.push("use a plain background without clutter".to_owned());
    }

    Suggestions { summary, details }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_buckets() {
        assert_eq!(score_image_quality(5_000).category, SizeCategory::TooSmall);
        assert_eq!(score_image_quality(50_000).category, SizeCategory::Small);
        assert_eq!(score_image_quality(500_000).category, SizeCategory::Medium);
        assert_eq!(score_image_quality(3_000_000).category, SizeCategory::Large);
        assert_eq!(
            score_image_quality(6_000_000).category,
            SizeCategory::Oversized
        );
    }

    #[test]
    fn test_quality_issues_reported() {
        let quality = score_image_quality(5_000);
        assert_eq!(quality.score, 1);
        assert_eq!(quality.issues.len(), 2);
        let quality = score_image_quality(500_000);
        assert_eq!(quality.score, 5);
        assert!(quality.issues.is_empty());
    }

    #[test]
    fn test_confidence_monotonic_in_length() {
        let quality = score_image_quality(500_000);
        let short = score_confidence("x=1", &quality);
        let medium = score_confidence("x = 1 + 2", &quality);
        let long = score_confidence(&"2x + 5 = 15, ".repeat(10), &quality);
        assert!(short <= medium);
        assert!(medium <= long);
    }

    #[test]
    fn test_confidence_stays_in_range() {
        let poor = score_image_quality(1_000);
        let good = score_image_quality(500_000);
        let low = score_confidence("", &poor);
        let high = score_confidence(&format!(r"\frac{{1}}{{2}} {}", "x+1 ".repeat(20)), &good);
        assert!((0.1..=0.99).contains(&low));
        assert!((0.1..=0.99).contains(&high));
    }

    #[test]
    fn test_suggestions_for_poor_quality() {
        let quality = score_image_quality(5_000);
        let suggestions = suggestions_for(&quality, None);
        assert_eq!(suggestions.summary, "image quality may be insufficient");
        assert!(suggestions.details.len() >= 3);
    }

    #[test]
    fn test_suggestions_for_media_error() {
        let quality = score_image_quality(500_000);
        let suggestions = suggestions_for(
            &quality,
            Some("HTTP 400: Failed to download the media resource"),
        );
        assert_eq!(suggestions.summary, "the image format may be the problem");
    }

    #[test]
    fn test_suggestions_default_branch() {
        let quality = score_image_quality(500_000);
        let suggestions = suggestions_for(&quality, Some("HTTP 500"));
        assert_eq!(
            suggestions.summary,
            "a complex formula may be hard to recognize"
        );
    }
}
