use std::time::Duration;

use crate::config::{ImageConfig, ScreenshotConfig};
use crate::images::{self, EncodingError};

#[derive(thiserror::Error, Debug)]
pub enum ScreenshotError {
    #[error("built without headless browser support")]
    Unavailable,

    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("failed to open tab: {0}")]
    Tab(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// Renders a page and returns the raw PNG capture.
pub trait Screenshotter: Send + Sync {
    fn capture(&self, url: &str, settle: Duration) -> Result<Vec<u8>, ScreenshotError>;
}

/// Capture `url` and turn it into an inline JPEG.
pub fn capture_inline(
    shooter: &dyn Screenshotter,
    url: &str,
    settle: Duration,
    images: &ImageConfig,
) -> Result<String, ScreenshotError> {
    let raw = shooter.capture(url, settle)?;
    log::debug!("{url}: captured {} bytes", raw.len());
    Ok(images::postprocess_with(&raw, images)?)
}

/// Headless Chromium, one fresh browser per capture.
pub struct ScreenshotEngine {
    #[cfg_attr(not(feature = "headless"), allow(dead_code))]
    config: ScreenshotConfig,
}

impl ScreenshotEngine {
    pub fn new(config: ScreenshotConfig) -> Self {
        Self { config }
    }

    pub fn settle_delay(&self, url: &str) -> Duration {
        self.config.settle_delay(url)
    }
}

impl Screenshotter for ScreenshotEngine {
    #[cfg(feature = "headless")]
    fn capture(&self, url: &str, settle: Duration) -> Result<Vec<u8>, ScreenshotError> {
        super::headless::capture_full_page(url, settle, &self.config)
    }

    #[cfg(not(feature = "headless"))]
    fn capture(&self, url: &str, _settle: Duration) -> Result<Vec<u8>, ScreenshotError> {
        log::debug!("{url}: screenshot skipped, headless feature disabled");
        Err(ScreenshotError::Unavailable)
    }
}
