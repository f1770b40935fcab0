//! Command-line entry points.

use std::{path::PathBuf, sync::Arc};

use clap::Args;

use crate::history::{FileStore, History};

pub mod history;
pub mod ocr;
pub mod solve;

/// Common options for subcommands that touch the history file.
#[derive(Debug, Clone, Args)]
pub struct StoreOpts {
    /// Where solved problems are stored.
    #[clap(long, default_value = "snapmath-history.json")]
    history_file: PathBuf,
}

impl StoreOpts {
    /// Open history over the configured file store.
    pub fn open_history(&self) -> History {
        History::new(Arc::new(FileStore::new(self.history_file.clone())))
    }
}
