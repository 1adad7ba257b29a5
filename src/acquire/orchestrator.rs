use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;

use crate::config::{AcquisitionConfig, Config, ImageConfig, ScreenshotConfig};
use crate::doctype;
use crate::metadata::{HttpMetadataSource, MetadataSource, PageMetadata};
use crate::scrape::screenshot::{capture_inline, ScreenshotEngine, Screenshotter};

use super::result::AcquisitionResult;
use super::upgrade::{PendingScreenshot, UpgradeOutcome};

// Upper bound on URLs acquired at once
const MAX_PARALLEL_ACQUISITIONS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Short metadata fetch, used only to label the card
    QuickMetadata,
    /// Card now, screenshot in the background
    DeferredCard,
    PreviewImage,
    Screenshot,
    DocCard,
}

const DOC_LIKE_CHAIN: &[Step] = &[Step::QuickMetadata, Step::DeferredCard];
const GENERIC_CHAIN: &[Step] = &[Step::PreviewImage, Step::Screenshot, Step::DocCard];

enum StepOutcome {
    Done(Acquisition),
    Continue,
}

/// Everything learned about one URL while walking a chain.
struct Attempt<'a> {
    url: &'a str,
    doc_like: bool,
    meta: Option<PageMetadata>,
    failures: Vec<String>,
}

/// Initial result for a URL plus the background capture, if one was started.
#[derive(Debug)]
pub struct Acquisition {
    pub result: AcquisitionResult,
    pub upgrade: Option<PendingScreenshot>,
}

impl Acquisition {
    fn finished(result: AcquisitionResult) -> Self {
        Self {
            result,
            upgrade: None,
        }
    }

    /// Wait for the background capture, if any, and return the final result.
    pub fn settle(self) -> AcquisitionResult {
        let Acquisition {
            mut result,
            upgrade,
        } = self;
        if let Some(pending) = upgrade {
            result.apply_upgrade(&pending.wait());
        }
        result
    }

    /// Like `settle`, but stops waiting at `deadline`. A capture still running
    /// then leaves the card pending.
    pub fn settle_until(self, deadline: Instant) -> AcquisitionResult {
        let Acquisition {
            mut result,
            upgrade,
        } = self;
        if let Some(mut pending) = upgrade {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match pending.wait_timeout(remaining) {
                Some(outcome) => result.apply_upgrade(outcome),
                None => log::warn!("{}: screenshot still running, keeping card", result.url),
            }
        }
        result
    }

    /// The result as of now, with the capture applied only if it already finished.
    pub fn snapshot(self) -> AcquisitionResult {
        let Acquisition {
            mut result,
            upgrade,
        } = self;
        if let Some(mut pending) = upgrade {
            if let Some(outcome) = pending.try_outcome() {
                result.apply_upgrade(outcome);
            }
        }
        result
    }
}

pub struct Orchestrator {
    metadata: Arc<dyn MetadataSource>,
    screenshots: Arc<dyn Screenshotter>,
    acquisition: AcquisitionConfig,
    screenshot: ScreenshotConfig,
    images: ImageConfig,
}

impl Orchestrator {
    pub fn new(config: &Config) -> Self {
        Self::with_sources(
            config,
            Arc::new(HttpMetadataSource::new(config.acquisition.user_agent.clone())),
            Arc::new(ScreenshotEngine::new(config.screenshot.clone())),
        )
    }

    pub fn with_sources(
        config: &Config,
        metadata: Arc<dyn MetadataSource>,
        screenshots: Arc<dyn Screenshotter>,
    ) -> Self {
        Self {
            metadata,
            screenshots,
            acquisition: config.acquisition.clone(),
            screenshot: config.screenshot.clone(),
            images: config.images.clone(),
        }
    }

    /// Acquire every URL concurrently. Output order matches input order and
    /// one URL failing, even by panicking, never affects the others.
    ///
    /// At most `MAX_PARALLEL_ACQUISITIONS` workers run; each takes the next
    /// unclaimed URL as soon as it is free.
    pub fn acquire_all(&self, urls: &[String]) -> Vec<Acquisition> {
        let next = AtomicUsize::new(0);
        let workers = urls.len().min(MAX_PARALLEL_ACQUISITIONS);

        let slots: Vec<Option<Acquisition>> = thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    s.spawn(|| {
                        let mut done = Vec::new();
                        loop {
                            let index = next.fetch_add(1, Ordering::Relaxed);
                            let Some(url) = urls.get(index) else {
                                break;
                            };
                            done.push((index, self.acquire_isolated(url)));
                        }
                        done
                    })
                })
                .collect();

            let mut slots: Vec<Option<Acquisition>> = urls.iter().map(|_| None).collect();
            for handle in handles {
                // acquire_isolated catches panics, so workers only end by finishing
                if let Ok(done) = handle.join() {
                    for (index, acquisition) in done {
                        slots[index] = Some(acquisition);
                    }
                }
            }
            slots
        });

        urls.iter()
            .zip(slots)
            .map(|(url, slot)| {
                slot.unwrap_or_else(|| {
                    Acquisition::finished(AcquisitionResult::failure(
                        url,
                        "acquisition aborted: worker lost",
                    ))
                })
            })
            .collect()
    }

    fn acquire_isolated(&self, url: &str) -> Acquisition {
        match panic::catch_unwind(AssertUnwindSafe(|| self.acquire(url))) {
            Ok(acquisition) => acquisition,
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                log::error!("url={url} outcome=panic error={msg}");
                Acquisition::finished(AcquisitionResult::failure(
                    url,
                    format!("acquisition aborted: {msg}"),
                ))
            }
        }
    }

    pub fn acquire(&self, url: &str) -> Acquisition {
        let doc_like = doctype::is_doc_like(url);
        let chain = if doc_like && self.acquisition.defer_doc_screenshots {
            DOC_LIKE_CHAIN
        } else {
            GENERIC_CHAIN
        };

        let mut attempt = Attempt {
            url,
            doc_like,
            meta: None,
            failures: Vec::new(),
        };

        for step in chain {
            match self.run_step(*step, &mut attempt) {
                StepOutcome::Done(acquisition) => {
                    log::info!(
                        "url={url} step={step:?} screenshot={} card={} pending={}",
                        acquisition.result.is_screenshot,
                        acquisition.result.is_doc_card,
                        acquisition.upgrade.is_some()
                    );
                    return acquisition;
                }
                StepOutcome::Continue => continue,
            }
        }

        let message = if attempt.failures.is_empty() {
            "no acquisition strategy succeeded".to_string()
        } else {
            attempt.failures.join("; ")
        };
        log::warn!("url={url} outcome=failed error={message}");
        Acquisition::finished(AcquisitionResult::failure(url, message))
    }

    fn run_step(&self, step: Step, attempt: &mut Attempt) -> StepOutcome {
        let url = attempt.url;

        match step {
            Step::QuickMetadata => {
                match self.metadata.fetch(url, self.acquisition.fast_fetch_timeout()) {
                    Ok(meta) => attempt.meta = Some(meta),
                    Err(err) => log::debug!("{url}: quick metadata unavailable: {err}"),
                }
                StepOutcome::Continue
            }

            Step::DeferredCard => {
                let result = AcquisitionResult::doc_card(url, attempt.meta.as_ref(), true);
                StepOutcome::Done(Acquisition {
                    result,
                    upgrade: Some(self.spawn_upgrade(url)),
                })
            }

            Step::PreviewImage => {
                match self.metadata.fetch(url, self.acquisition.fetch_timeout()) {
                    Ok(meta) if meta.has_image() => {
                        return StepOutcome::Done(Acquisition::finished(
                            AcquisitionResult::preview(url, &meta),
                        ));
                    }
                    Ok(meta) => {
                        log::debug!("{url}: no preview image in metadata");
                        attempt.meta = Some(meta);
                    }
                    Err(err) => attempt.failures.push(format!("metadata fetch failed: {err}")),
                }
                StepOutcome::Continue
            }

            Step::Screenshot => {
                let settle = self.screenshot.settle_delay(url);
                match capture_inline(self.screenshots.as_ref(), url, settle, &self.images) {
                    Ok(inline_jpeg) => StepOutcome::Done(Acquisition::finished(
                        AcquisitionResult::screenshot(url, attempt.meta.as_ref(), inline_jpeg),
                    )),
                    Err(err) => {
                        attempt.failures.push(format!("screenshot failed: {err}"));
                        StepOutcome::Continue
                    }
                }
            }

            Step::DocCard if attempt.doc_like => StepOutcome::Done(Acquisition::finished(
                AcquisitionResult::doc_card(url, attempt.meta.as_ref(), false),
            )),

            Step::DocCard => StepOutcome::Continue,
        }
    }

    fn spawn_upgrade(&self, url: &str) -> PendingScreenshot {
        let (tx, rx) = mpsc::channel();

        let screenshots = Arc::clone(&self.screenshots);
        let images = self.images.clone();
        let settle = self.screenshot.settle_delay(url);
        let target = url.to_string();

        let spawned = thread::Builder::new()
            .name("screenshot-upgrade".to_string())
            .spawn(move || {
                let outcome = match capture_inline(screenshots.as_ref(), &target, settle, &images) {
                    Ok(inline_jpeg) => UpgradeOutcome::Captured(inline_jpeg),
                    Err(err) => {
                        log::info!("{target}: background screenshot failed: {err}");
                        UpgradeOutcome::Failed(err.to_string())
                    }
                };
                // nobody may be listening anymore
                let _ = tx.send(outcome);
            });

        // a failed spawn drops the sender, which the handle reports as a failure
        if let Err(err) = spawned {
            log::error!("{url}: cannot start screenshot worker: {err}");
        }

        PendingScreenshot::new(rx)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panicked".to_string())
}
