use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod acquire;
mod card;
mod cli;
mod config;
mod doctype;
mod images;
mod metadata;
mod rules;
mod scrape;
mod semantic;
#[cfg(test)]
mod tests;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting");

    match args.command {
        cli::Command::Card {
            title,
            url,
            site,
            description,
        } => cli::card(&title, &url, &site, &description),

        cli::Command::Classify { url, site } => cli::classify(&url, &site),

        cli::Command::Acquire {
            urls,
            wait,
            wait_timeout,
            no_defer,
        } => {
            let config = cli::load_config(args.config.as_deref())?;
            let wait = match wait_timeout {
                Some(secs) => cli::Wait::Until(Duration::from_secs(secs)),
                None if wait => cli::Wait::Settle,
                None => cli::Wait::No,
            };
            cli::acquire(&config, &urls, wait, no_defer)
        }

        cli::Command::Search {
            corpus,
            text,
            image,
            top_k,
        } => {
            let config = cli::load_config(args.config.as_deref())?;
            cli::search(&config, &corpus, text.as_deref(), image.as_deref(), top_k)
        }
    }
}
