use std::{path::PathBuf, sync::Arc, thread::sleep, time::Duration, time::Instant};

use headless_chrome::{
    protocol::cdp::{Emulation, Page},
    Browser, LaunchOptionsBuilder, Tab,
};

use super::screenshot::ScreenshotError;
use crate::config::ScreenshotConfig;

// Chromium refuses captures taller than this.
const MAX_CAPTURE_HEIGHT: f64 = 16384.0;

/// Launch a browser, load `url` and capture the full page as PNG.
///
/// Navigation is waited on up to the configured timeout; if the page never
/// reports itself as loaded we warn and capture whatever rendered.
pub fn capture_full_page(
    url: &str,
    settle: Duration,
    config: &ScreenshotConfig,
) -> Result<Vec<u8>, ScreenshotError> {
    let host = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string());

    // Browser::drop kills the process on every return path below.
    let browser = launch(config)?;

    let tab = browser
        .new_tab()
        .map_err(|e| ScreenshotError::Tab(e.to_string()))?;

    let result = capture_in_tab(&tab, &host, url, settle, config);
    let _ = tab.close(true);
    result
}

fn launch(config: &ScreenshotConfig) -> Result<Browser, ScreenshotError> {
    // keep the browser alive through navigation plus every wait
    let idle_timeout = config.navigation_timeout()
        + config.network_idle_timeout()
        + Duration::from_secs(60);

    let options = LaunchOptionsBuilder::default()
        .sandbox(false)
        .window_size(Some((config.viewport_width, config.viewport_height)))
        .idle_browser_timeout(idle_timeout)
        .path(config.chrome_path.as_ref().map(PathBuf::from))
        .build()
        .map_err(|e| ScreenshotError::Launch(e.to_string()))?;

    Browser::new(options).map_err(|e| {
        log::error!("failed to start chrome: {e}");
        ScreenshotError::Launch(e.to_string())
    })
}

fn capture_in_tab(
    tab: &Arc<Tab>,
    host: &str,
    url: &str,
    settle: Duration,
    config: &ScreenshotConfig,
) -> Result<Vec<u8>, ScreenshotError> {
    tab.set_default_timeout(config.navigation_timeout());
    tab.call_method(viewport_override(config)?)
        .map_err(|e| ScreenshotError::Tab(e.to_string()))?;
    tab.set_user_agent(&config.user_agent, Some(config.locale.as_str()), None)
        .map_err(|e| ScreenshotError::Tab(e.to_string()))?;

    if let Err(err) = tab.call_method(Emulation::SetTimezoneOverride {
        timezone_id: config.timezone.clone(),
    }) {
        log::debug!("{host}: timezone override rejected: {err}");
    }
    if let Err(err) = tab.call_method(Emulation::SetLocaleOverride {
        locale: Some(config.locale.clone()),
    }) {
        log::debug!("{host}: locale override rejected: {err}");
    }

    tab.navigate_to(url).map_err(|e| {
        log::error!("{host}: {e}");
        ScreenshotError::Navigation(e.to_string())
    })?;

    if let Err(err) = tab.wait_until_navigated() {
        log::warn!("{host}: navigation did not finish ({err}), capturing anyway");
    }

    wait_for_network_idle(tab, host, config.network_idle_timeout());

    log::debug!("{host}: settling for {settle:?}");
    sleep(settle);

    let _ = tab.evaluate("window.scrollTo(0, 0)", false);
    sleep(config.scroll_settle());

    let (width, height) = page_size(tab, config);
    let clip = Page::Viewport {
        x: 0.0,
        y: 0.0,
        width,
        height,
        scale: 1.0,
    };

    tab.capture_screenshot(
        Page::CaptureScreenshotFormatOption::Png,
        None,
        Some(clip),
        true,
    )
    .map_err(|e| ScreenshotError::Capture(e.to_string()))
}

// Built from JSON so optional fields added by newer protocol revisions default.
fn viewport_override(
    config: &ScreenshotConfig,
) -> Result<Emulation::SetDeviceMetricsOverride, ScreenshotError> {
    serde_json::from_value(serde_json::json!({
        "width": config.viewport_width,
        "height": config.viewport_height,
        "deviceScaleFactor": 1.0,
        "mobile": false,
    }))
    .map_err(|e| ScreenshotError::Tab(e.to_string()))
}

/// Poll `document.readyState` until the page reports complete. Timing out is
/// not an error.
fn wait_for_network_idle(tab: &Arc<Tab>, host: &str, timeout: Duration) {
    let started = Instant::now();
    while started.elapsed() < timeout {
        let ready = tab
            .evaluate("document.readyState", false)
            .ok()
            .and_then(|obj| obj.value)
            .and_then(|v| v.as_str().map(|s| s == "complete"))
            .unwrap_or(false);
        if ready {
            return;
        }
        sleep(Duration::from_millis(100));
    }
    log::debug!("{host}: page still loading after {timeout:?}");
}

fn page_size(tab: &Arc<Tab>, config: &ScreenshotConfig) -> (f64, f64) {
    let read = |expr: &str, fallback: u32| {
        tab.evaluate(expr, false)
            .ok()
            .and_then(|obj| obj.value)
            .and_then(|v| v.as_f64())
            .filter(|v| *v >= 1.0)
            .unwrap_or(fallback as f64)
    };

    let width = read(
        "Math.max(document.documentElement.scrollWidth, document.body ? document.body.scrollWidth : 0)",
        config.viewport_width,
    );
    let height = read(
        "Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0)",
        config.viewport_height,
    );

    (width, height.min(MAX_CAPTURE_HEIGHT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_override_uses_configured_size() {
        let config = ScreenshotConfig::default();
        let metrics = viewport_override(&config).unwrap();
        assert_eq!(metrics.width, 1920);
        assert_eq!(metrics.height, 1080);
        assert!(!metrics.mobile);
        assert_eq!(metrics.scale, None);
    }

    #[test]
    #[ignore = "requires chromium"]
    fn captures_a_data_url_page() {
        let config = ScreenshotConfig {
            default_wait_secs: 0.0,
            scroll_settle_secs: 0.0,
            network_idle_timeout_secs: 1,
            ..Default::default()
        };
        let png = capture_full_page(
            "data:text/html,<h1>hello</h1>",
            Duration::ZERO,
            &config,
        )
        .unwrap();
        assert!(infer::is_image(&png));
    }
}
