//! The `solve` subcommand.

use std::io::Write as _;

use clap::Args;

use crate::{
    cmd::StoreOpts,
    config::ApiConfig,
    prelude::*,
    solve::{SolveMethod, Solver},
    stream::ProgressEvent,
};

/// Options for the `solve` subcommand.
#[derive(Debug, Args)]
pub struct SolveOpts {
    /// The math expression to solve.
    pub expression: String,

    /// How the model should work through the problem.
    #[clap(long, value_enum, default_value_t = SolveMethod::default())]
    pub method: SolveMethod,

    /// Print the final solution as JSON instead of streaming text.
    #[clap(long)]
    pub json: bool,

    /// Do not record the solution in history.
    #[clap(long)]
    pub no_save: bool,

    #[clap(flatten)]
    pub store: StoreOpts,
}

/// Run the `solve` subcommand.
///
/// Reasoning deltas go to stderr and answer deltas to stdout, so piping
/// stdout captures only the solution text.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_solve(opts: &SolveOpts) -> Result<()> {
    let config = ApiConfig::from_env()?;
    let solver = Solver::new(config);

    let streaming = !opts.json;
    let solution = solver
        .solve(&opts.expression, opts.method, |event| {
            if !streaming {
                return;
            }
            match event {
                ProgressEvent::Thinking(text) => {
                    eprint!("{text}");
                    let _ = std::io::stderr().flush();
                }
                ProgressEvent::Content(text) => {
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                }
                _ => {}
            }
        })
        .await?;
    if streaming {
        println!();
        println!("result: {}", solution.result);
    } else {
        println!("{}", serde_json::to_string_pretty(&solution)?);
    }

    if !opts.no_save {
        opts.store
            .open_history()
            .save(&solution)
            .context("failed to record solution in history")?;
    }
    Ok(())
}
