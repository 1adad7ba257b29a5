#[cfg(feature = "headless")]
pub mod headless;
pub mod screenshot;

use std::{error::Error, time::Duration};

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::metadata::{FetchError, PageMetadata};

pub fn get_error(error: &reqwest::Error) -> String {
    match error.source() {
        Some(e) => match e.source() {
            Some(e) => e.to_string(),
            None => e.to_string(),
        },
        None => error.to_string(),
    }
}

pub fn http_client(
    user_agent: &str,
    timeout: Duration,
) -> reqwest::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(10))
        .build()
}

/// Single GET with no retries. A non-2xx status is an error.
pub fn fetch_page(url: &str, user_agent: &str, timeout: Duration) -> Result<String, FetchError> {
    let url = if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.to_string()
    };

    let url_parsed =
        reqwest::Url::parse(&url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
    if !matches!(url_parsed.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl(format!(
            "{url}: unsupported scheme {}",
            url_parsed.scheme()
        )));
    }

    let host = url_parsed.host_str().unwrap_or_default().to_string();

    let client = http_client(user_agent, timeout)
        .map_err(|e| FetchError::Connection(get_error(&e)))?;

    log::debug!("{host}: requesting");

    let resp = client.get(url_parsed).send().map_err(|err| {
        log::debug!("{host}: {err}: {}", get_error(&err));
        FetchError::from_reqwest(&err)
    })?;

    let status = resp.status();
    if !status.is_success() {
        log::debug!("{host}: {status}");
        return Err(FetchError::Status(status.as_u16()));
    }

    let bytes = resp.bytes().map_err(|err| FetchError::from_reqwest(&err))?;
    if bytes.contains(&0) {
        return Err(FetchError::Parse("response body is not text".to_string()));
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// Not scoped to <head>: the parser moves late tags into <body>.
static META_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta").expect("valid selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("valid selector"));
static JSON_LD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector")
});

/// Read OpenGraph data from `html`, falling back to plain meta tags, the
/// `<title>` element and JSON-LD. Relative image URLs are resolved against `url`.
pub fn get_data_from_page(html: &str, url: &str) -> PageMetadata {
    let document = Html::parse_document(html);

    let mut tags: Vec<(String, String)> = Vec::new();
    for element in document.select(&META_SELECTOR) {
        let key = element
            .attr("property")
            .or_else(|| element.attr("name"))
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        let value = element.attr("content").unwrap_or_default().trim();
        if !key.is_empty() && !value.is_empty() {
            tags.push((key, value.to_string()));
        }
    }

    let pick = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| tags.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()))
    };

    let title_tag = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let json_ld = json_ld_fields(&document);

    let title = pick(&["og:title", "twitter:title", "title"])
        .or(title_tag)
        .or(json_ld.title);
    let description = pick(&["og:description", "description", "twitter:description"])
        .or(json_ld.description);
    let image_url = pick(&["og:image", "og:image:url", "twitter:image"])
        .or(json_ld.image_url)
        .and_then(|img| resolve_url(url, &img));
    let site_name = pick(&["og:site_name", "application-name"]);

    PageMetadata {
        title,
        description,
        image_url,
        site_name,
    }
}

/// Resolve `href` relative to `base`. Protocol-relative links get `https:`.
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("//") {
        return Some(format!("https:{href}"));
    }
    if let Ok(absolute) = reqwest::Url::parse(href) {
        return Some(absolute.to_string());
    }

    match reqwest::Url::parse(base).and_then(|b| b.join(href)) {
        Ok(joined) => Some(joined.to_string()),
        Err(err) => {
            log::debug!("cannot resolve {href:?} against {base:?}: {err}");
            None
        }
    }
}

#[derive(Default)]
struct JsonLdFields {
    title: Option<String>,
    description: Option<String>,
    image_url: Option<String>,
}

fn json_ld_fields(document: &Html) -> JsonLdFields {
    let mut fields = JsonLdFields::default();
    for element in document.select(&JSON_LD_SELECTOR) {
        let text = element.text().collect::<String>();
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
            collect_json_ld(&json, &mut fields);
        }
    }
    fields
}

fn collect_json_ld(json: &serde_json::Value, fields: &mut JsonLdFields) {
    if let Some(items) = json
        .get("@graph")
        .and_then(|g| g.as_array())
        .or_else(|| json.as_array())
    {
        for item in items {
            collect_json_ld(item, fields);
        }
        return;
    }

    let text = |value: Option<&serde_json::Value>| {
        value
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if fields.title.is_none() {
        fields.title = text(json.get("headline")).or_else(|| text(json.get("name")));
    }
    if fields.description.is_none() {
        fields.description = text(json.get("description"));
    }
    if fields.image_url.is_none() {
        let image = json.get("image").or_else(|| json.get("thumbnailUrl"));
        let image = match image {
            Some(serde_json::Value::Array(arr)) => arr.first(),
            other => other,
        };
        fields.image_url = text(image).or_else(|| text(image.and_then(|i| i.get("url"))));
    }
}
