use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Event-driven real-estate investment pipeline — ingest MLS-style feeds,
/// enrich listings, estimate rents, underwrite, and fire saved-search
/// alerts, with a composed read gateway on top.
#[derive(Parser)]
#[command(name = "prop-flow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the gateway and the full pipeline in one process
    Serve {
        /// Listen address (overrides PF_HTTP_ADDR)
        #[arg(long)]
        addr: Option<String>,

        /// SQLite path (overrides PF_DB_PATH)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// JSON feed file to poll (overrides PF_FEED_URL)
        #[arg(long)]
        feed: Option<PathBuf>,
    },

    /// Run the headless pipeline: poll, enrich, estimate, underwrite, alert
    Pipeline {
        /// JSON feed file to poll (overrides PF_FEED_URL)
        #[arg(long)]
        feed: Option<PathBuf>,

        /// SQLite path (overrides PF_DB_PATH)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Run one poll cycle, drain, and exit
        #[arg(long)]
        once: bool,
    },

    /// Output JSON Schemas for feed items, saved searches, assumptions,
    /// and the event envelope
    Schema,

    /// Output an example feed file to stdout
    Example,
}
