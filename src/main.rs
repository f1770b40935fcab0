use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::prelude::*;

mod catalog;
mod cmd;
mod config;
mod data_url;
mod decode;
mod executor;
mod history;
mod ocr;
mod orchestrator;
mod prelude;
mod quality;
mod solve;
mod stream;

/// Photograph a math problem, recognize it, solve it.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - DASHSCOPE_API_KEY: The DashScope key to use.
  - DASHSCOPE_API_BASE (optional): Override the native API base URL.
  - DASHSCOPE_COMPATIBLE_BASE (optional): Override the OpenAI-compatible base URL.
  - SNAPMATH_TIMEOUT_MS (optional): Per-request deadline in milliseconds.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Recognize the math expression in an image.
    Ocr(cmd::ocr::OcrOpts),
    /// Solve a math expression, streaming progress as it arrives.
    Solve(cmd::solve::SolveOpts),
    /// Inspect or edit the solved-problem history.
    History(cmd::history::HistoryOpts),
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing. Logs always go to stderr; stdout belongs to the
    // subcommands.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    // We can stack multiple layers here if we need to.
    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main().await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main() -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Ocr(opts) => {
            cmd::ocr::cmd_ocr(opts).await?;
        }
        Cmd::Solve(opts) => {
            cmd::solve::cmd_solve(opts).await?;
        }
        Cmd::History(opts) => {
            cmd::history::cmd_history(opts).await?;
        }
    }
    Ok(())
}
