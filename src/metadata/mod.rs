pub mod types;

pub use types::{FetchError, PageMetadata};

use std::time::Duration;

/// Source of page metadata. The acquisition chain only talks to this trait so
/// tests can swap the network out.
pub trait MetadataSource: Send + Sync {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<PageMetadata, FetchError>;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// Fetches the page over HTTP and reads its OpenGraph tags.
pub struct HttpMetadataSource {
    user_agent: String,
}

impl HttpMetadataSource {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

impl MetadataSource for HttpMetadataSource {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<PageMetadata, FetchError> {
        let html = crate::scrape::fetch_page(url, &self.user_agent, timeout)?;
        let meta = crate::scrape::get_data_from_page(&html, url);

        log::info!(
            "fetcher={} url={url} title={} image={}",
            self.name(),
            meta.title.is_some(),
            meta.has_image()
        );

        Ok(meta)
    }

    fn name(&self) -> &'static str {
        "opengraph"
    }
}
