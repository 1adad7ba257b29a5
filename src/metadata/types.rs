use serde::{Deserialize, Serialize};

/// Why a page could not be turned into metadata
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("http status {0}")]
    Status(u16),

    #[error("timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("failed to read body: {0}")]
    Body(String),

    #[error("unparsable page: {0}")]
    Parse(String),
}

impl FetchError {
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout
        } else if error.is_body() || error.is_decode() {
            FetchError::Body(crate::scrape::get_error(error))
        } else {
            FetchError::Connection(crate::scrape::get_error(error))
        }
    }
}

/// Fields scraped from a page head. Empty values are stored as `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Absolute URL of the preview image
    pub image_url: Option<String>,
    pub site_name: Option<String>,
}

impl PageMetadata {
    pub fn has_image(&self) -> bool {
        self.image_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    pub fn title_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.title.as_deref().unwrap_or(fallback)
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }

    pub fn site_name(&self) -> &str {
        self.site_name.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_image_is_not_an_image() {
        let meta = PageMetadata {
            image_url: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(!meta.has_image());
        assert!(PageMetadata {
            image_url: Some("https://example.com/a.png".to_string()),
            ..Default::default()
        }
        .has_image());
    }

    #[test]
    fn accessors_fall_back() {
        let meta = PageMetadata::default();
        assert_eq!(meta.title_or("https://example.com"), "https://example.com");
        assert_eq!(meta.description(), "");
        assert_eq!(meta.site_name(), "");
    }
}
