//! Parsing raw model output into domain fields.
//!
//! Everything in this module is an ordered pattern-matching heuristic:
//! expression extraction, step splitting, final-answer extraction, and the
//! type/difficulty classifiers. The patterns and thresholds are deliberately
//! kept compatible with historical result data, so replacing them means
//! replacing this module, not tweaking callers.
//!
//! The keyword patterns are Chinese because that is what the solver models
//! emit when prompted in Chinese.

use std::{fmt, sync::LazyLock};

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Structured fields decoded from one raw model response.
#[derive(Clone, Debug, PartialEq)]
pub struct Decoded {
    /// The best candidate math expression found in the text.
    pub math_expression: String,

    /// Ordered solution steps.
    pub steps: Vec<String>,

    /// The final answer.
    pub final_answer: String,
}

/// Decode raw model text. Pure: identical input always yields identical
/// output.
pub fn decode(raw: &str) -> Decoded {
    Decoded {
        math_expression: extract_math_expression(raw),
        steps: parse_steps(raw),
        final_answer: extract_final_answer(raw),
    }
}

static EXPRESSION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Fenced LaTeX.
        r"\$\$(.+?)\$\$",
        // Inline LaTeX.
        r"\$(.+?)\$",
        // A run of digits, operators, Greek letters, comparison symbols
        // and variables.
        r"[0-9+\-*/()^=√∑∏∫αβγπ≠≤≥∞x-z]+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

/// Extract the first plausible math expression from recognized text.
///
/// Tries fenced LaTeX, then inline LaTeX, then a raw symbol run. If nothing
/// matches, the whole trimmed input is returned verbatim, never an empty
/// placeholder.
pub fn extract_math_expression(text: &str) -> String {
    for pattern in EXPRESSION_PATTERNS.iter() {
        if let Some(found) = pattern.find(text) {
            return found.as_str().replace('$', "").trim().to_owned();
        }
    }
    text.trim().to_owned()
}

static STEP_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // "1. ..." or "1、..." numbered lists.
        r"(?m)^\s*\d+[.、]\s*(.+?)\s*$",
        // "步骤N: ..." lines.
        r"(?m)步骤\s*\d+[：:]\s*(.+?)\s*$",
        // "第N步: ..." lines.
        r"(?m)第\s*\d+\s*步[：:]\s*(.+?)\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

/// Split solution text into ordered steps.
///
/// The first pattern that yields at least one match wins and is used
/// exclusively; patterns are never merged. With no recognizable step
/// markers, each non-blank line becomes a step.
pub fn parse_steps(content: &str) -> Vec<String> {
    for pattern in STEP_PATTERNS.iter() {
        let steps: Vec<String> = pattern
            .captures_iter(content)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
        if !steps.is_empty() {
            return steps;
        }
    }
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

static ANSWER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?m)答案[：:]?\s*(.+?)\s*$",
        r"(?m)结果[：:]?\s*(.+?)\s*$",
        r"(?m)因此[：:]?\s*(.+?)\s*$",
        r"(?m)所以[：:]?\s*(.+?)\s*$",
        r"\\boxed\{([^}]+)\}",
        r"(?m)最终答案[：:]?\s*(.+?)\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

/// Answer used when nothing in the text looks like an answer.
pub const UNKNOWN_ANSWER: &str = "无法确定答案";

/// Extract the final answer from solution text.
///
/// Tries the keyword-anchored patterns in order; the first match wins. With
/// no match, falls back to the last non-blank line, which may well be
/// explanatory prose rather than an answer.
pub fn extract_final_answer(content: &str) -> String {
    for pattern in ANSWER_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(content) {
            if let Some(m) = caps.get(1) {
                return m.as_str().trim().to_owned();
            }
        }
    }
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or(UNKNOWN_ANSWER)
        .to_owned()
}

/// Surface-syntax classification of a problem.
#[derive(
    Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[clap(rename_all = "lowercase")]
pub enum ProblemType {
    Algebra,
    Calculus,
    Equation,
    Arithmetic,
    Inequality,
    Geometry,
    Other,
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProblemType::Algebra => "algebra",
            ProblemType::Calculus => "calculus",
            ProblemType::Equation => "equation",
            ProblemType::Arithmetic => "arithmetic",
            ProblemType::Inequality => "inequality",
            ProblemType::Geometry => "geometry",
            ProblemType::Other => "other",
        };
        write!(f, "{s}")
    }
}

static CALCULUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[∫∑∏]").expect("static regex"));
static EQUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z][^=]*=").expect("static regex"));
static ARITHMETIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[+\-*/]").expect("static regex"));
static INEQUALITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[≤≥<>]").expect("static regex"));
static ALGEBRA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[√^²³]").expect("static regex"));
static GEOMETRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[△∠°]").expect("static regex"));

/// Classify a problem by the surface syntax of its expression (not the full
/// explanation text).
pub fn problem_type(expression: &str) -> ProblemType {
    if CALCULUS_RE.is_match(expression) {
        ProblemType::Calculus
    } else if EQUATION_RE.is_match(expression) {
        ProblemType::Equation
    } else if ARITHMETIC_RE.is_match(expression) {
        ProblemType::Arithmetic
    } else if INEQUALITY_RE.is_match(expression) {
        ProblemType::Inequality
    } else if ALGEBRA_RE.is_match(expression) {
        ProblemType::Algebra
    } else if GEOMETRY_RE.is_match(expression) {
        ProblemType::Geometry
    } else {
        ProblemType::Other
    }
}

/// Estimated difficulty of a problem.
#[derive(
    Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[clap(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        write!(f, "{s}")
    }
}

static DIFFICULTY_MID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[√^]").expect("static regex"));
static DIFFICULTY_LOW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[+\-*/()]").expect("static regex"));

/// Bucket an expression into easy/medium/hard by a weighted sum of
/// symbol-complexity signals.
pub fn difficulty(expression: &str) -> Difficulty {
    let mut complexity = 0;
    if CALCULUS_RE.is_match(expression) {
        complexity += 3;
    }
    if DIFFICULTY_MID_RE.is_match(expression) {
        complexity += 2;
    }
    if DIFFICULTY_LOW_RE.is_match(expression) {
        complexity += 1;
    }
    if expression.chars().count() > 50 {
        complexity += 1;
    }
    match complexity {
        0..=2 => Difficulty::Easy,
        3..=4 => Difficulty::Medium,
        _ => Difficulty::Hard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_math_expression_prefers_fenced_latex() {
        assert_eq!(
            extract_math_expression("The formula is $$x^2 + 1$$ here"),
            "x^2 + 1"
        );
        assert_eq!(extract_math_expression("inline $y = 2x$ form"), "y = 2x");
    }

    #[test]
    fn test_extract_math_expression_symbol_run() {
        assert_eq!(extract_math_expression("数学表达式: 2x+5=15"), "2x+5=15");
    }

    #[test]
    fn test_extract_math_expression_falls_back_to_input() {
        assert_eq!(extract_math_expression("  没有任何符号  "), "没有任何符号");
    }

    #[test]
    fn test_parse_steps_numbered() {
        assert_eq!(parse_steps("1. a\n2. b\n3. c"), vec!["a", "b", "c"]);
        assert_eq!(parse_steps("1、移项\n2、化简"), vec!["移项", "化简"]);
    }

    #[test]
    fn test_parse_steps_chinese_markers() {
        assert_eq!(parse_steps("步骤1: 移项\n步骤2: 化简"), vec!["移项", "化简"]);
        assert_eq!(parse_steps("第1步: 移项\n第2步: 化简"), vec!["移项", "化简"]);
    }

    #[test]
    fn test_parse_steps_first_pattern_wins_exclusively() {
        // Numbered lines win; the 步骤 line is kept as the body of its
        // numbered step, not matched separately.
        let steps = parse_steps("1. 步骤1: 移项\n2. 化简");
        assert_eq!(steps, vec!["步骤1: 移项", "化简"]);
    }

    #[test]
    fn test_parse_steps_fallback_per_line() {
        assert_eq!(
            parse_steps("first line\n\nsecond line\n"),
            vec!["first line", "second line"]
        );
    }

    #[test]
    fn test_extract_final_answer_keywords() {
        assert_eq!(extract_final_answer("步骤...\n答案: x=5"), "x=5");
        assert_eq!(extract_final_answer("所以 x=3"), "x=3");
        assert_eq!(extract_final_answer(r"推导得 \boxed{42} 即可"), "42");
    }

    #[test]
    fn test_extract_final_answer_last_line_fallback() {
        assert_eq!(
            extract_final_answer("we discuss\nthe last line\n"),
            "the last line"
        );
        assert_eq!(extract_final_answer(""), UNKNOWN_ANSWER);
    }

    #[test]
    fn test_decode_is_idempotent() {
        let raw = "1. 移项\n2. 化简\n答案: x=5";
        assert_eq!(decode(raw), decode(raw));
    }

    #[test]
    fn test_problem_type() {
        assert_eq!(problem_type("∫x dx"), ProblemType::Calculus);
        assert_eq!(problem_type("2x + 5 = 15"), ProblemType::Equation);
        assert_eq!(problem_type("2 + 3 * 4"), ProblemType::Arithmetic);
        assert_eq!(problem_type("x ≤ 5"), ProblemType::Inequality);
        assert_eq!(problem_type("x²"), ProblemType::Algebra);
        assert_eq!(problem_type("∠ABC"), ProblemType::Geometry);
        assert_eq!(problem_type("hello"), ProblemType::Other);
    }

    #[test]
    fn test_difficulty_buckets() {
        assert_eq!(difficulty("2x + 5 = 15"), Difficulty::Easy);
        assert_eq!(difficulty("√(x+1) * 2"), Difficulty::Medium);
        assert_eq!(difficulty("∫(x^2 + 1) dx"), Difficulty::Hard);
    }

    #[test]
    fn test_difficulty_length_bonus() {
        let long = "1+".repeat(30);
        // Operators (+1) plus length over 50 chars (+1) stays easy.
        assert_eq!(difficulty(&long), Difficulty::Easy);
    }
}
