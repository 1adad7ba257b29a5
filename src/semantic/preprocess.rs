//! Text sent to the embedding service for an acquired page.

/// Maximum embedding input, in characters
const MAX_CONTENT_CHARS: usize = 512;

const TRUNCATION_SUFFIX: &str = "...";

/// Join title and description into one embedding input.
///
/// Returns `None` if both are blank.
pub fn preprocess_content(title: &str, description: &str) -> Option<String> {
    let title = title.trim();
    let description = description.trim();

    let content = match (title.is_empty(), description.is_empty()) {
        (true, true) => return None,
        (false, true) => title.to_string(),
        (true, false) => description.to_string(),
        (false, false) => format!("{title} - {description}"),
    };

    Some(truncate_content(content))
}

fn truncate_content(content: String) -> String {
    if content.chars().count() <= MAX_CONTENT_CHARS {
        return content;
    }

    let keep = MAX_CONTENT_CHARS - TRUNCATION_SUFFIX.len();
    let mut truncated: String = content.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_SUFFIX);
    truncated
}
