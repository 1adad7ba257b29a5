use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use homedir::my_home;
use serde::Serialize;

use crate::acquire::{AcquisitionResult, Orchestrator};
use crate::config::Config;
use crate::semantic::{CorpusItem, EmbeddingClient, SearchRanker};
use crate::doctype;

pub fn default_config_path() -> Result<PathBuf> {
    let base_path = match std::env::var("TABCARD_BASE_PATH") {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => {
            let home = my_home()
                .context("could not determine home directory")?
                .context("home directory path is empty")?;
            home.join(".local/share/tabcard")
        }
    };

    Ok(base_path.join("config.yaml"))
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };
    log::debug!("config: {}", path.display());
    Config::load_with(&path).with_context(|| format!("loading {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// How long `acquire` waits for background screenshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Print immediately; only captures that already finished are applied
    No,
    Settle,
    Until(Duration),
}

pub fn acquire(config: &Config, urls: &[String], wait: Wait, no_defer: bool) -> Result<()> {
    let mut config = config.clone();
    if no_defer {
        config.acquisition.defer_doc_screenshots = false;
    }

    let orchestrator = Orchestrator::new(&config);
    let acquisitions = orchestrator.acquire_all(urls);

    let results: Vec<AcquisitionResult> = match wait {
        Wait::Settle => acquisitions.into_iter().map(|a| a.settle()).collect(),
        Wait::Until(timeout) => {
            let deadline = Instant::now() + timeout;
            acquisitions
                .into_iter()
                .map(|a| a.settle_until(deadline))
                .collect()
        }
        // captures still running are abandoned when the process exits
        Wait::No => acquisitions.into_iter().map(|a| a.snapshot()).collect(),
    };

    let failed = results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        log::warn!("{failed} of {} urls failed", results.len());
    }

    print_json(&results)
}

pub fn card(title: &str, url: &str, site: &str, description: &str) -> Result<()> {
    println!("{}", crate::card::synthesize(title, url, site, description));
    Ok(())
}

#[derive(Serialize)]
struct Classification<'a> {
    url: &'a str,
    doc_like: bool,
    #[serde(flatten)]
    doc_type: doctype::DocType,
    label: &'static str,
}

pub fn classify(url: &str, site: &str) -> Result<()> {
    let doc_type = doctype::classify(url, site);
    print_json(&Classification {
        url,
        doc_like: doctype::is_doc_like(url),
        doc_type,
        label: doc_type.category.label(),
    })
}

pub fn search(
    config: &Config,
    corpus_path: &Path,
    text: Option<&str>,
    image: Option<&str>,
    top_k: Option<usize>,
) -> Result<()> {
    if text.is_none() && image.is_none() {
        bail!("provide --text, --image or both");
    }

    let raw = std::fs::read_to_string(corpus_path)
        .with_context(|| format!("reading {}", corpus_path.display()))?;
    let corpus: Vec<CorpusItem> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", corpus_path.display()))?;

    config.embedding.require_api_key()?;

    let client = EmbeddingClient::new(
        config.embedding.clone(),
        config.images.clone(),
        config.acquisition.user_agent.clone(),
    )?;
    let ranker = SearchRanker::new(
        Arc::new(client),
        config.embedding.clone(),
        config.fusion.clone(),
    );

    let ranked = ranker.search(text, image, &corpus, top_k.unwrap_or(config.fusion.top_k))?;
    print_json(&ranked)
}
