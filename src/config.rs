use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rules::KeywordRule;
use crate::semantic::fusion::{Normalization, SimilarityWeights};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const DEFAULT_BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const DEFAULT_EMBEDDING_ENDPOINT: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/embeddings/multimodal-embedding/multimodal-embedding";
const DEFAULT_EMBEDDING_MODEL: &str = "qwen2.5-vl-embedding";
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1024;
const DEFAULT_API_KEY_ENV: &str = "DASHSCOPE_API_KEY";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("config is malformed: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("missing credential: set {0}")]
    MissingCredential(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Budget for the metadata fetch on the generic path
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Budget for the display-only fetch on the doc-like fast path
    #[serde(default = "default_fast_fetch_timeout_secs")]
    pub fast_fetch_timeout_secs: u64,

    /// Return a placeholder card for doc-like pages right away and screenshot them
    /// in the background.
    #[serde(default = "default_true")]
    pub defer_doc_screenshots: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            fast_fetch_timeout_secs: default_fast_fetch_timeout_secs(),
            defer_doc_screenshots: true,
        }
    }
}

impl AcquisitionConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn fast_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fast_fetch_timeout_secs)
    }
}

/// Minimum settle time for hosts that render slowly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WaitRule {
    pub hosts: KeywordRule,
    pub min_wait_secs: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScreenshotConfig {
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    #[serde(default = "default_browser_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,
    #[serde(default = "default_network_idle_timeout_secs")]
    pub network_idle_timeout_secs: u64,
    #[serde(default = "default_wait_secs")]
    pub default_wait_secs: f64,
    #[serde(default = "default_scroll_settle_secs")]
    pub scroll_settle_secs: f64,
    /// Checked in order; the first matching rule raises the settle time.
    #[serde(default = "default_slow_hosts")]
    pub slow_hosts: Vec<WaitRule>,
    /// Falls back to `CHROME_PATH`, then to headless_chrome's own lookup.
    #[serde(default)]
    pub chrome_path: Option<String>,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            user_agent: default_browser_user_agent(),
            locale: default_locale(),
            timezone: default_timezone(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
            network_idle_timeout_secs: default_network_idle_timeout_secs(),
            default_wait_secs: default_wait_secs(),
            scroll_settle_secs: default_scroll_settle_secs(),
            slow_hosts: default_slow_hosts(),
            chrome_path: None,
        }
    }
}

impl ScreenshotConfig {
    /// Extra wait applied after navigation before the page is captured.
    pub fn settle_delay(&self, url: &str) -> Duration {
        let rule_wait = self
            .slow_hosts
            .iter()
            .find(|rule| rule.hosts.is_match(&[url]))
            .map(|rule| rule.min_wait_secs)
            .unwrap_or(0.0);

        Duration::from_secs_f64(self.default_wait_secs.max(rule_wait))
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn network_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.network_idle_timeout_secs)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_secs_f64(self.scroll_settle_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Longest edge after resizing
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_quality")]
    pub quality: u8,
    /// Tried in order while the encoded image exceeds `max_encoded_bytes`
    #[serde(default = "default_fallback_qualities")]
    pub fallback_qualities: Vec<u8>,
    #[serde(default = "default_max_encoded_bytes")]
    pub max_encoded_bytes: usize,
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: usize,
    /// Remote images smaller than this on either side are rejected
    #[serde(default = "default_min_dimension")]
    pub min_dimension: u32,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            quality: default_quality(),
            fallback_qualities: default_fallback_qualities(),
            max_encoded_bytes: default_max_encoded_bytes(),
            max_download_bytes: default_max_download_bytes(),
            min_dimension: default_min_dimension(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

impl ImageConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    /// Never written back to disk; usually supplied through `api_key_env`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause after every corpus embedding call
    #[serde(default = "default_embed_delay_ms")]
    pub embed_delay_ms: u64,
    /// Pause after every query embedding call
    #[serde(default = "default_query_delay_ms")]
    pub query_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            dimensions: default_embedding_dimensions(),
            api_key: None,
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
            batch_size: default_batch_size(),
            embed_delay_ms: default_embed_delay_ms(),
            query_delay_ms: default_query_delay_ms(),
        }
    }
}

impl EmbeddingConfig {
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.trim().is_empty())
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key()
            .ok_or_else(|| ConfigError::MissingCredential(self.api_key_env.clone()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn embed_delay(&self) -> Duration {
        Duration::from_millis(self.embed_delay_ms)
    }

    pub fn query_delay(&self) -> Duration {
        Duration::from_millis(self.query_delay_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FusionConfig {
    #[serde(default = "default_weights")]
    pub default_weights: SimilarityWeights,
    #[serde(default = "default_image_focused_weights")]
    pub image_focused_weights: SimilarityWeights,
    #[serde(default = "default_doc_focused_weights")]
    pub doc_focused_weights: SimilarityWeights,
    #[serde(default = "default_image_focused_sites")]
    pub image_focused_sites: KeywordRule,
    #[serde(default = "default_doc_focused_sites")]
    pub doc_focused_sites: KeywordRule,
    #[serde(default)]
    pub normalization: Normalization,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            default_weights: default_weights(),
            image_focused_weights: default_image_focused_weights(),
            doc_focused_weights: default_doc_focused_weights(),
            image_focused_sites: default_image_focused_sites(),
            doc_focused_sites: default_doc_focused_sites(),
            normalization: Normalization::default(),
            top_k: default_top_k(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub screenshot: ScreenshotConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
}

impl Config {
    /// Load `path` if it exists, otherwise start from defaults. Environment
    /// overrides are applied before validation.
    pub fn load_with(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            if raw.trim().is_empty() {
                Self::default()
            } else {
                serde_yml::from_str(&raw)?
            }
        } else {
            log::debug!("{}: not found, using defaults", path.display());
            Self::default()
        };

        config.apply_env();
        config.validate()?;

        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(&self.embedding.api_key_env) {
            if !key.trim().is_empty() {
                self.embedding.api_key = Some(key);
            }
        }

        if self.screenshot.chrome_path.is_none() {
            self.screenshot.chrome_path = std::env::var("CHROME_PATH").ok().filter(|p| !p.is_empty());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        let acq = &self.acquisition;
        if acq.fetch_timeout_secs == 0 || acq.fast_fetch_timeout_secs == 0 {
            return invalid("acquisition timeouts must be greater than 0".into());
        }

        let shot = &self.screenshot;
        if shot.viewport_width == 0 || shot.viewport_height == 0 {
            return invalid("screenshot viewport must be non-empty".into());
        }
        if shot.navigation_timeout_secs == 0 {
            return invalid("screenshot.navigation_timeout_secs must be greater than 0".into());
        }
        for (name, secs) in [
            ("default_wait_secs", shot.default_wait_secs),
            ("scroll_settle_secs", shot.scroll_settle_secs),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return invalid(format!("screenshot.{name} must be a non-negative number"));
            }
        }
        for (idx, rule) in shot.slow_hosts.iter().enumerate() {
            if !rule.min_wait_secs.is_finite() || rule.min_wait_secs < 0.0 {
                return invalid(format!("screenshot.slow_hosts #{} has a bad wait", idx + 1));
            }
            rule.hosts
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("screenshot.slow_hosts #{}: {e}", idx + 1)))?;
        }

        let img = &self.images;
        if img.max_dimension == 0 {
            return invalid("images.max_dimension must be greater than 0".into());
        }
        if img.max_encoded_bytes == 0 || img.max_download_bytes == 0 {
            return invalid("images byte limits must be greater than 0".into());
        }
        if std::iter::once(&img.quality)
            .chain(img.fallback_qualities.iter())
            .any(|q| !(1..=100).contains(q))
        {
            return invalid("images qualities must be within 1..=100".into());
        }

        let emb = &self.embedding;
        if emb.dimensions == 0 {
            return invalid("embedding.dimensions must be greater than 0".into());
        }
        if emb.batch_size == 0 {
            return invalid("embedding.batch_size must be greater than 0".into());
        }
        if reqwest::Url::parse(&emb.endpoint).is_err() {
            return invalid(format!("embedding.endpoint is not a URL: {}", emb.endpoint));
        }

        let fusion = &self.fusion;
        for (name, weights) in [
            ("default_weights", fusion.default_weights),
            ("image_focused_weights", fusion.image_focused_weights),
            ("doc_focused_weights", fusion.doc_focused_weights),
        ] {
            if !weights.is_finite() {
                return invalid(format!("fusion.{name} must be finite"));
            }
        }
        fusion
            .image_focused_sites
            .validate()
            .and_then(|_| fusion.doc_focused_sites.validate())
            .map_err(|e| ConfigError::Invalid(format!("fusion sites: {e}")))?;
        if fusion.top_k == 0 {
            return invalid("fusion.top_k must be greater than 0".into());
        }

        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_browser_user_agent() -> String {
    DEFAULT_BROWSER_USER_AGENT.to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_fast_fetch_timeout_secs() -> u64 {
    5
}

fn default_viewport_width() -> u32 {
    1920
}

fn default_viewport_height() -> u32 {
    1080
}

fn default_locale() -> String {
    "zh-CN".to_string()
}

fn default_timezone() -> String {
    "Asia/Shanghai".to_string()
}

fn default_navigation_timeout_secs() -> u64 {
    30
}

fn default_network_idle_timeout_secs() -> u64 {
    5
}

fn default_wait_secs() -> f64 {
    2.0
}

fn default_scroll_settle_secs() -> f64 {
    0.5
}

fn default_slow_hosts() -> Vec<WaitRule> {
    vec![
        WaitRule {
            hosts: KeywordRule::new(["notion.so", "feishu", "docs.google.com"]),
            min_wait_secs: 3.0,
        },
        WaitRule {
            hosts: KeywordRule::new(["mp.weixin.qq.com", "docs.xiaohongshu.com"]),
            min_wait_secs: 2.5,
        },
    ]
}

fn default_max_dimension() -> u32 {
    1024
}

fn default_quality() -> u8 {
    85
}

fn default_fallback_qualities() -> Vec<u8> {
    vec![70, 60, 50, 40]
}

fn default_max_encoded_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_max_download_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_min_dimension() -> u32 {
    100
}

fn default_download_timeout_secs() -> u64 {
    10
}

fn default_embedding_endpoint() -> String {
    DEFAULT_EMBEDDING_ENDPOINT.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_dimensions() -> usize {
    DEFAULT_EMBEDDING_DIMENSIONS
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_batch_size() -> usize {
    10
}

fn default_embed_delay_ms() -> u64 {
    150
}

fn default_query_delay_ms() -> u64 {
    50
}

fn default_weights() -> SimilarityWeights {
    SimilarityWeights::new(0.4, 0.6)
}

fn default_image_focused_weights() -> SimilarityWeights {
    SimilarityWeights::new(0.1, 0.9)
}

fn default_doc_focused_weights() -> SimilarityWeights {
    SimilarityWeights::new(0.7, 0.3)
}

fn default_image_focused_sites() -> KeywordRule {
    KeywordRule::new(["pinterest", "behance", "dribbble", "instagram", "unsplash", "flickr"])
}

fn default_doc_focused_sites() -> KeywordRule {
    KeywordRule::new([
        "blog",
        "docs",
        "wiki",
        "zhihu",
        "medium",
        "juejin",
        "csdn",
        "readthedocs",
        "github",
    ])
}

fn default_top_k() -> usize {
    20
}
