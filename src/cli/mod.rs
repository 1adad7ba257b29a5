use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod handlers;

pub use handlers::*;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Config file [default: $TABCARD_BASE_PATH/config.yaml or ~/.local/share/tabcard/config.yaml]
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch previews for one or more URLs and print them as JSON
    Acquire {
        #[clap(required = true)]
        urls: Vec<String>,

        /// Wait for background screenshots and print the upgraded results
        #[clap(long, default_value = "false")]
        wait: bool,

        /// Stop waiting for background screenshots after this many seconds (implies --wait)
        #[clap(long)]
        wait_timeout: Option<u64>,

        /// Screenshot doc-like pages right away instead of returning a card first
        #[clap(long, default_value = "false")]
        no_defer: bool,
    },

    /// Render a placeholder card and print its data URI
    Card {
        #[clap(short, long)]
        title: String,

        #[clap(short, long)]
        url: String,

        #[clap(short, long, default_value = "")]
        site: String,

        #[clap(short, long, default_value = "")]
        description: String,
    },

    /// Show how a URL is classified
    Classify {
        url: String,

        #[clap(short, long, default_value = "")]
        site: String,
    },

    /// Rank a saved corpus of acquisition results against a query
    Search {
        /// JSON array of acquisition results
        #[clap(short, long)]
        corpus: PathBuf,

        /// Text query
        #[clap(short, long)]
        text: Option<String>,

        /// Image query: URL, data URI or raw base64
        #[clap(short, long)]
        image: Option<String>,

        /// Number of results [default: fusion.top_k]
        #[clap(short = 'k', long)]
        top_k: Option<usize>,
    },
}
