//! The strategy catalog and endpoint resolver.
//!
//! Both are pure, deterministic lookups. Ordering is significant: the
//! orchestrator tries strategies and endpoints in catalog order and stops at
//! the first usable result, so adding or reordering entries changes attempt
//! order and nothing else.

use crate::config::ApiConfig;

/// A logical model operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Extract text and math from an image with a vision model.
    VisionRecognition,

    /// Generate a step-by-step solution with a text model.
    TextCompletion,
}

/// A named attempt configuration: which model to call, with which prompt,
/// and how many tokens it may spend.
#[derive(Clone, Debug)]
pub struct Strategy {
    /// Human-readable name, also reported as `model` in results.
    pub name: &'static str,

    /// The hosted model identifier.
    pub model_id: &'static str,

    /// The prompt template. May reference `{{{expression}}}`.
    pub prompt_template: &'static str,

    /// Completion token budget for this attempt.
    pub max_tokens: u32,
}

/// How responses from an endpoint arrive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    /// A single buffered JSON envelope.
    BufferedJson,

    /// Incremental server-sent-event frames.
    EventStream,
}

/// A candidate network endpoint for an operation.
#[derive(Clone, Debug)]
pub struct Endpoint {
    /// The full URL to POST to.
    pub url: String,

    /// How this endpoint delivers its response.
    pub transport: Transport,
}

/// List the strategies for an operation, in attempt order.
pub fn strategies(operation: Operation) -> Vec<Strategy> {
    match operation {
        Operation::VisionRecognition => vec![
            Strategy {
                name: "high-accuracy",
                model_id: "qwen-vl-max",
                prompt_template: "请仔细识别这张图片中的所有数学公式和文字。保持原有格式，对于复杂公式请用LaTeX格式表示。",
                max_tokens: 1000,
            },
            Strategy {
                name: "simplified",
                model_id: "qwen-vl-max",
                prompt_template: "请识别图片中的主要数学内容，简化复杂格式。",
                max_tokens: 500,
            },
            Strategy {
                name: "math-focused",
                model_id: "qwen-vl-max",
                prompt_template: "这是一张数学题图片。请提取所有数学表达式、公式和题目文字。",
                max_tokens: 800,
            },
        ],
        // One strategy per solve method. The solver selects by name rather
        // than falling back through them.
        Operation::TextCompletion => vec![
            Strategy {
                name: "thinking",
                model_id: "qwen-plus-2025-04-28",
                prompt_template: "请深度思考并解决以下数学问题：{{{expression}}}\n\n请开启思考模式，详细分析每一步的逻辑推理过程。",
                max_tokens: 16384,
            },
            Strategy {
                name: "cot",
                model_id: "qwen-plus-2025-04-28",
                prompt_template: "请使用逐步推理的方法解决以下数学问题。请按照以下格式回答：\n1. 问题分析：分析题目类型和要求\n2. 解题思路：说明解题方法和步骤\n3. 详细计算：展示完整的计算过程\n4. 最终答案：给出明确的答案\n\n问题：{{{expression}}}\n\n请开始解答：",
                max_tokens: 16384,
            },
            Strategy {
                name: "tir",
                model_id: "qwen-plus-2025-04-28",
                prompt_template: "请使用工具集成推理的方法解决以下数学问题。你可以使用代码来辅助计算：\n\n问题：{{{expression}}}\n\n请按照以下步骤：\n1. 分析问题类型\n2. 设计解题算法\n3. 编写计算代码（如需要）\n4. 执行计算并验证\n5. 给出最终答案\n\n请开始解答：",
                max_tokens: 16384,
            },
        ],
    }
}

/// List the candidate endpoints for an operation, primary first.
pub fn endpoints(operation: Operation, config: &ApiConfig) -> Vec<Endpoint> {
    match operation {
        Operation::VisionRecognition => vec![
            Endpoint {
                url: format!("{}/multimodal-generation/generation", config.base_url),
                transport: Transport::BufferedJson,
            },
            // Fallback mirror under a slightly different path prefix. Some
            // regions route only one of these.
            Endpoint {
                url: "https://dashscope.aliyuncs.com/api/v1/multimodal-generation/generation"
                    .to_owned(),
                transport: Transport::BufferedJson,
            },
        ],
        Operation::TextCompletion => vec![Endpoint {
            url: format!("{}/chat/completions", config.compatible_url),
            transport: Transport::EventStream,
        }],
    }
}
