//! The `history` subcommand.

use anyhow::bail;
use clap::{Args, Subcommand};

use crate::{
    cmd::StoreOpts,
    decode::{Difficulty, ProblemType},
    history::HistoryFilter,
    prelude::*,
};

/// Options for the `history` subcommand.
#[derive(Debug, Args)]
pub struct HistoryOpts {
    #[clap(subcommand)]
    pub action: HistoryAction,
}

/// What to do with the history.
#[derive(Debug, Subcommand)]
pub enum HistoryAction {
    /// List solved problems, newest first.
    List {
        /// Page number, starting at 1.
        #[clap(long, default_value = "1")]
        page: usize,

        /// Entries per page.
        #[clap(long, default_value = "20")]
        limit: usize,

        /// Only show problems of this type.
        #[clap(long = "type", value_enum)]
        problem_type: Option<ProblemType>,

        /// Only show problems of this difficulty.
        #[clap(long, value_enum)]
        difficulty: Option<Difficulty>,

        #[clap(flatten)]
        store: StoreOpts,
    },
    /// Delete one solved problem by id.
    Delete {
        /// The problem id.
        id: String,

        #[clap(flatten)]
        store: StoreOpts,
    },
    /// Delete all history.
    Clear {
        #[clap(flatten)]
        store: StoreOpts,
    },
}

/// Run the `history` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_history(opts: &HistoryOpts) -> Result<()> {
    match &opts.action {
        HistoryAction::List {
            page,
            limit,
            problem_type,
            difficulty,
            store,
        } => {
            let history = store.open_history();
            let page = history.list(
                *page,
                *limit,
                HistoryFilter {
                    problem_type: *problem_type,
                    difficulty: *difficulty,
                },
            )?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        HistoryAction::Delete { id, store } => {
            let history = store.open_history();
            if !history.delete(id)? {
                bail!("no history entry with id {id:?}");
            }
            info!(id, "deleted history entry");
        }
        HistoryAction::Clear { store } => {
            store.open_history().clear()?;
            info!("cleared history");
        }
    }
    Ok(())
}
