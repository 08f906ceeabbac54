//! CLI for bookfetch.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use bookfetch_core::config::{self, BookfetchConfig};
use clap::{Parser, Subcommand};

use commands::{run_document, run_search, run_skip, run_status};

/// Top-level CLI for bookfetch.
#[derive(Debug, Parser)]
#[command(name = "bookfetch")]
#[command(about = "Find and download the books of a catalog, once each", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/bookfetch/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Maximum downloads in flight (overrides max_concurrent_downloads).
    #[arg(long, short = 'j', global = true, value_name = "N")]
    pub jobs: Option<usize>,

    /// Root for progress documents and downloads (overrides output_dir).
    #[arg(long, global = true, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Search and download every outstanding item of a progress document.
    Run {
        /// Document path, or its key under the output directory.
        document: String,
    },

    /// Build a document from free-form searches, then download it.
    Search {
        /// "Title|Author" (author optional). Repeat for several books.
        #[arg(long = "book", value_name = "TITLE|AUTHOR", required = true)]
        books: Vec<String>,
    },

    /// Show items, remaining candidates and completion of a document.
    Status {
        /// Document path, or its key under the output directory.
        document: String,
    },

    /// Mark an item as skipped (and complete) so runs leave it alone.
    Skip {
        /// Document path, or its key under the output directory.
        document: String,
        /// Item key.
        item: String,
    },
}

impl Cli {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = cli.load_config()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run { document } => run_document(&cfg, &document).await?,
            CliCommand::Search { books } => run_search(&cfg, &books).await?,
            CliCommand::Status { document } => run_status(&cfg, &document)?,
            CliCommand::Skip { document, item } => run_skip(&cfg, &document, &item)?,
        }

        Ok(())
    }

    /// Config file plus command-line overrides.
    fn load_config(&self) -> Result<BookfetchConfig> {
        let mut cfg = match &self.config {
            Some(path) => config::load_or_init_at(path)?,
            None => config::load_or_init()?,
        };
        if let Some(jobs) = self.jobs {
            cfg.max_concurrent_downloads = jobs;
        }
        if let Some(dir) = &self.output_dir {
            cfg.output_dir = Some(dir.clone());
        }
        Ok(cfg.normalized())
    }
}

#[cfg(test)]
mod tests;
