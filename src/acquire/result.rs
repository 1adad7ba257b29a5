use serde::{Deserialize, Serialize};

use crate::doctype::{self, DocCategory};
use crate::metadata::PageMetadata;

use super::upgrade::UpgradeOutcome;

/// What acquisition produced for one URL.
///
/// At most one of `is_screenshot` and `is_doc_card` is set, and
/// `pending_screenshot` implies `is_doc_card`. Failures carry an `error` and
/// empty presentation fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionResult {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Remote image URL or inline data URI
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub site_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<DocCategory>,
    pub success: bool,
    #[serde(default)]
    pub is_screenshot: bool,
    #[serde(default)]
    pub is_doc_card: bool,
    #[serde(default)]
    pub pending_screenshot: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AcquisitionResult {
    /// Page metadata with a preview image.
    pub fn preview(url: &str, meta: &PageMetadata) -> Self {
        Self {
            url: url.to_string(),
            title: meta.title_or(url).to_string(),
            description: meta.description().to_string(),
            image: meta.image_url.clone().unwrap_or_default(),
            site_name: meta.site_name().to_string(),
            doc_type: None,
            success: true,
            is_screenshot: false,
            is_doc_card: false,
            pending_screenshot: false,
            error: None,
        }
    }

    /// A rendered capture. Without metadata the title falls back to the URL and
    /// the description to a generated note.
    pub fn screenshot(url: &str, meta: Option<&PageMetadata>, inline_jpeg: String) -> Self {
        let (title, description, site_name) = match meta {
            Some(meta) => (
                meta.title_or(url).to_string(),
                meta.description().to_string(),
                meta.site_name().to_string(),
            ),
            None => {
                let site = crate::card::site_name_from_url(url);
                let description = if site.is_empty() {
                    "Page screenshot".to_string()
                } else {
                    format!("Page screenshot of {site}")
                };
                (url.to_string(), description, String::new())
            }
        };

        Self {
            url: url.to_string(),
            title,
            description,
            image: inline_jpeg,
            site_name,
            doc_type: None,
            success: true,
            is_screenshot: true,
            is_doc_card: false,
            pending_screenshot: false,
            error: None,
        }
    }

    /// A synthesized placeholder card.
    pub fn doc_card(url: &str, meta: Option<&PageMetadata>, pending: bool) -> Self {
        let title = meta.map(|m| m.title_or(url)).unwrap_or(url).to_string();
        let description = meta.map(|m| m.description()).unwrap_or_default().to_string();
        let site_name = meta
            .map(|m| m.site_name().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| crate::card::site_name_from_url(url));
        let doc = doctype::classify(url, &site_name);
        let image = crate::card::synthesize(&title, url, &site_name, &description);

        Self {
            url: url.to_string(),
            title,
            description,
            image,
            site_name,
            doc_type: Some(doc.category),
            success: true,
            is_screenshot: false,
            is_doc_card: true,
            pending_screenshot: pending,
            error: None,
        }
    }

    pub fn failure(url: &str, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            title: String::new(),
            description: String::new(),
            image: String::new(),
            site_name: String::new(),
            doc_type: None,
            success: false,
            is_screenshot: false,
            is_doc_card: false,
            pending_screenshot: false,
            error: Some(message.into()),
        }
    }

    /// Fold a background capture into a pending card. Results that are not
    /// pending are left untouched.
    pub fn apply_upgrade(&mut self, outcome: &UpgradeOutcome) {
        if !self.pending_screenshot {
            return;
        }

        self.pending_screenshot = false;
        match outcome {
            UpgradeOutcome::Captured(inline_jpeg) => {
                self.image = inline_jpeg.clone();
                self.is_screenshot = true;
                self.is_doc_card = false;
            }
            UpgradeOutcome::Failed(msg) => {
                log::info!("{}: keeping card, screenshot failed: {msg}", self.url);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> PageMetadata {
        PageMetadata {
            title: Some("Title".to_string()),
            description: Some("Desc".to_string()),
            image_url: Some("https://example.com/og.png".to_string()),
            site_name: Some("Example".to_string()),
        }
    }

    #[test]
    fn preview_copies_metadata() {
        let r = AcquisitionResult::preview("https://example.com", &meta());
        assert!(r.success && !r.is_screenshot && !r.is_doc_card && !r.pending_screenshot);
        assert_eq!(r.image, "https://example.com/og.png");
        assert_eq!(r.site_name, "Example");
    }

    #[test]
    fn screenshot_without_metadata_uses_url() {
        let r = AcquisitionResult::screenshot("https://www.example.com/x", None, "data:x".into());
        assert_eq!(r.title, "https://www.example.com/x");
        assert_eq!(r.description, "Page screenshot of example.com");
        assert!(r.is_screenshot && !r.is_doc_card);
    }

    #[test]
    fn doc_card_is_classified() {
        let r = AcquisitionResult::doc_card("https://github.com/a/b", None, true);
        assert_eq!(r.doc_type, Some(DocCategory::CodeRepository));
        assert_eq!(r.site_name, "github.com");
        assert!(r.image.starts_with("data:image/svg+xml;base64,"));
        assert!(r.is_doc_card && r.pending_screenshot && !r.is_screenshot);
    }

    #[test]
    fn failure_has_no_presentation() {
        let r = AcquisitionResult::failure("https://example.com", "boom");
        assert!(!r.success);
        assert!(r.title.is_empty() && r.image.is_empty());
        assert_eq!(r.error.as_deref(), Some("boom"));
    }

    #[test]
    fn upgrade_replaces_card_with_capture() {
        let mut r = AcquisitionResult::doc_card("https://github.com/a/b", Some(&meta()), true);
        r.apply_upgrade(&UpgradeOutcome::Captured("data:image/jpeg;base64,AA".into()));
        assert!(r.is_screenshot && !r.is_doc_card && !r.pending_screenshot);
        assert_eq!(r.image, "data:image/jpeg;base64,AA");
        assert_eq!(r.title, "Title");
    }

    #[test]
    fn failed_upgrade_keeps_card() {
        let mut r = AcquisitionResult::doc_card("https://github.com/a/b", None, true);
        let card = r.image.clone();
        r.apply_upgrade(&UpgradeOutcome::Failed("timeout".into()));
        assert!(r.is_doc_card && !r.is_screenshot && !r.pending_screenshot);
        assert_eq!(r.image, card);
    }

    #[test]
    fn upgrade_ignored_when_not_pending() {
        let mut r = AcquisitionResult::preview("https://example.com", &meta());
        let before = r.clone();
        r.apply_upgrade(&UpgradeOutcome::Captured("data:x".into()));
        assert_eq!(r, before);
    }

    #[test]
    fn serializes_flags_in_snake_case() {
        let r = AcquisitionResult::doc_card("https://github.com/a/b", None, true);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["pending_screenshot"], true);
        assert_eq!(json["doc_type"], "code_repository");
        assert!(json.get("error").is_none());
    }
}
