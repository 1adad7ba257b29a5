//! Placeholder cards rendered as inline SVG.
//!
//! A card stands in for a preview image until a screenshot is available. It
//! encodes the page title, site and classified type so it is still useful as
//! a visual anchor.

use crate::doctype;
use crate::images::{to_data_uri, SVG_MIME};

const CARD_WIDTH: u32 = 320;
const CARD_HEIGHT: u32 = 240;

const TITLE_MAX_CHARS: usize = 40;
const DESCRIPTION_MAX_CHARS: usize = 60;
const URL_MAX_CHARS: usize = 60;

const FONT_SANS: &str = "-apple-system, BlinkMacSystemFont, 'Segoe UI', Arial, sans-serif";
const FONT_MONO: &str = "Monaco, 'Courier New', monospace";

/// Render a card for `url` and return it as a `data:image/svg+xml;base64,…` URI.
pub fn synthesize(title: &str, url: &str, site_name: &str, description: &str) -> String {
    let doc = doctype::classify(url, site_name);

    let site_name = if site_name.trim().is_empty() {
        site_name_from_url(url)
    } else {
        site_name.trim().to_string()
    };

    let title = if title.trim().is_empty() {
        url
    } else {
        title.trim()
    };

    let title_display = escape_xml(&truncate(title, TITLE_MAX_CHARS));
    let site_display = escape_xml(&site_name);
    let desc_display = escape_xml(&truncate(description.trim(), DESCRIPTION_MAX_CHARS));
    let url_display = escape_xml(&truncate(url, URL_MAX_CHARS));
    let label = escape_xml(doc.category.label());

    let (w, h) = (CARD_WIDTH, CARD_HEIGHT);
    let center = w / 2;

    let description_line = if desc_display.is_empty() {
        String::new()
    } else {
        format!(
            r##"<text x="16" y="150" font-family="{FONT_SANS}" font-size="11" fill="#888888">{desc_display}</text>"##
        )
    };

    let svg = format!(
        r##"<svg width="{w}" height="{h}" xmlns="http://www.w3.org/2000/svg" data-doc-type="{label}">
  <defs>
    <linearGradient id="grad" x1="0%" y1="0%" x2="0%" y2="100%">
      <stop offset="0%" style="stop-color:{bg};stop-opacity:1" />
      <stop offset="100%" style="stop-color:#ffffff;stop-opacity:1" />
    </linearGradient>
    <filter id="shadow">
      <feDropShadow dx="0" dy="2" stdDeviation="4" flood-opacity="0.15"/>
    </filter>
  </defs>
  <rect width="{w}" height="{h}" fill="url(#grad)" rx="12" stroke="{color}" stroke-width="2" filter="url(#shadow)"/>
  <g transform="translate(16, 16)">
    <text x="0" y="28" font-family="{FONT_SANS}" font-size="32" fill="{color}">{icon}</text>
    <rect x="44" y="4" width="110" height="28" rx="14" fill="{color}" opacity="0.2"/>
    <text x="99" y="24" font-family="{FONT_SANS}" font-size="13" font-weight="700" fill="{color}" text-anchor="middle">{label}</text>
  </g>
  <rect x="16" y="60" width="{banner_w}" height="50" rx="8" fill="{color}" opacity="0.12"/>
  <text x="{center}" y="88" font-family="{FONT_SANS}" font-size="16" font-weight="700" fill="#1a1a1a" text-anchor="middle" dominant-baseline="middle">
    <tspan x="{center}" dy="0">{title_display}</tspan>
  </text>
  <text x="16" y="130" font-family="{FONT_SANS}" font-size="12" font-weight="600" fill="#666666">{site_display}</text>
  {description_line}
  <rect x="16" y="{badge_y}" width="130" height="24" rx="12" fill="{color}" opacity="0.9"/>
  <text x="81" y="{badge_text_y}" font-family="{FONT_SANS}" font-size="11" font-weight="600" fill="#ffffff" text-anchor="middle">{label} doc</text>
  <text x="{url_x}" y="{url_y}" font-family="{FONT_MONO}" font-size="9" fill="#999999" text-anchor="end">{url_display}</text>
</svg>"##,
        bg = doc.background_color,
        color = doc.color,
        icon = doc.icon,
        banner_w = w - 32,
        badge_y = h - 40,
        badge_text_y = h - 24,
        url_x = w - 16,
        url_y = h - 12,
    );

    to_data_uri(SVG_MIME, svg.as_bytes())
}

/// Host of `url` without a leading `www.`; empty when the URL does not parse.
pub fn site_name_from_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .map(|host| host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
        .unwrap_or_default()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::parse_data_uri;

    fn render(title: &str, url: &str, site: &str, desc: &str) -> String {
        let uri = synthesize(title, url, site, desc);
        let (mime, bytes) = parse_data_uri(&uri).expect("card must be a data uri");
        assert_eq!(mime, SVG_MIME);
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn long_title_is_truncated_to_forty_chars() {
        let title = "A".repeat(45);
        let svg = render(&title, "https://example.com", "", "");
        let expected = format!(">{}...<", "A".repeat(40));
        assert!(svg.contains(&expected));
        assert!(!svg.contains(&"A".repeat(41)));
    }

    #[test]
    fn short_title_is_verbatim() {
        let title = "B".repeat(40);
        let svg = render(&title, "https://example.com", "", "");
        assert!(svg.contains(&format!(">{title}<")));
        assert!(!svg.contains(&format!("{title}...")));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let title = "文".repeat(41);
        let svg = render(&title, "https://example.com", "", "");
        assert!(svg.contains(&format!("{}...", "文".repeat(40))));
    }

    #[test]
    fn description_and_url_are_truncated() {
        let desc = "d".repeat(70);
        let url = format!("https://example.com/{}", "p".repeat(80));
        let svg = render("t", &url, "", &desc);
        assert!(svg.contains(&format!("{}...", "d".repeat(60))));
        let url_head: String = url.chars().take(60).collect();
        assert!(svg.contains(&format!("{url_head}...")));
    }

    #[test]
    fn reserved_characters_are_escaped() {
        let svg = render(r#"<a href="x">Tom & 'Jerry'</a>"#, "https://example.com", "", "");
        assert!(svg.contains("&lt;a href=&quot;x&quot;&gt;Tom &amp; &apos;Jerry&apos;"));
        assert!(!svg.contains("<a href"));
    }

    #[test]
    fn site_name_derived_from_host() {
        assert_eq!(site_name_from_url("https://www.example.com/a"), "example.com");
        assert_eq!(site_name_from_url("https://docs.rs/serde"), "docs.rs");
        assert_eq!(site_name_from_url("not a url"), "");

        let svg = render("t", "https://www.example.com/a", "", "");
        assert!(svg.contains(">example.com<"));
    }

    #[test]
    fn card_carries_classification() {
        let svg = render("repo", "https://github.com/foo/bar", "", "");
        assert!(svg.contains("#0366d6"));
        assert!(svg.contains("💻"));
        assert!(svg.contains(r#"data-doc-type="code repository""#));
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = synthesize("Title", "https://github.com/a/b", "GitHub", "desc");
        let b = synthesize("Title", "https://github.com/a/b", "GitHub", "desc");
        assert_eq!(a, b);
    }

    #[test]
    fn empty_fields_still_render() {
        let svg = render("", "", "", "");
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
    }
}
