//! API configuration, loaded from the environment.
//!
//! We talk to DashScope through two separate surfaces: the "native" API
//! (used by the vision endpoints, with its own envelope format) and the
//! OpenAI-compatible API (used for streaming chat completions). Both may be
//! overridden for testing against a local gateway.

use std::{env, time::Duration};

use crate::prelude::*;

/// Default DashScope native API base.
pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/api/v1/services/aigc";

/// Default OpenAI-compatible API base.
pub const DEFAULT_COMPATIBLE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// Default per-attempt deadline, in milliseconds. One value applies to every
/// network attempt.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Credentials and endpoints for the hosted model APIs.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// The DashScope API key, from `DASHSCOPE_API_KEY`.
    pub api_key: String,

    /// Base URL for the native API.
    pub base_url: String,

    /// Base URL for the OpenAI-compatible API.
    pub compatible_url: String,

    /// Hard deadline applied to each network attempt.
    pub timeout: Duration,
}

impl ApiConfig {
    /// Load our configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("DASHSCOPE_API_KEY")
            .context("DASHSCOPE_API_KEY is not set (see --help)")?;
        let base_url = env::var("DASHSCOPE_API_BASE")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
        let compatible_url = env::var("DASHSCOPE_COMPATIBLE_BASE")
            .unwrap_or_else(|_| DEFAULT_COMPATIBLE_URL.to_owned());
        let timeout_ms = match env::var("SNAPMATH_TIMEOUT_MS") {
            Ok(value) => value
                .parse::<u64>()
                .with_context(|| format!("invalid SNAPMATH_TIMEOUT_MS: {value:?}"))?,
            Err(_) => DEFAULT_TIMEOUT_MS,
        };
        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_owned(),
            compatible_url: compatible_url.trim_end_matches('/').to_owned(),
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}
