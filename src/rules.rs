use regex::Regex;
use serde::{Deserialize, Serialize};

/// Ordered list of URL patterns.
///
/// A pattern is either a case-insensitive substring or, when written as
/// `r/<regex>/`, a regular expression matched against the raw input.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordRule {
    patterns: Vec<String>,
}

impl KeywordRule {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_string_matches(match_query: &str, input: &str) -> bool {
        match regex_body(match_query) {
            Some(body) => match Regex::new(body) {
                Ok(regex) => regex.is_match(input),
                Err(err) => {
                    log::warn!("ignoring malformed pattern {match_query:?}: {err}");
                    false
                }
            },
            None => input.to_lowercase().contains(&match_query.to_lowercase()),
        }
    }

    /// True when any pattern matches any of `inputs`.
    pub fn is_match(&self, inputs: &[&str]) -> bool {
        self.patterns.iter().any(|pattern| {
            inputs
                .iter()
                .filter(|input| !input.is_empty())
                .any(|input| Self::is_string_matches(pattern, input))
        })
    }

    /// Reports the first pattern that cannot be compiled.
    pub fn validate(&self) -> Result<(), String> {
        for pattern in &self.patterns {
            if pattern.is_empty() {
                return Err("empty pattern".to_string());
            }
            if let Some(body) = regex_body(pattern) {
                Regex::new(body).map_err(|err| format!("{pattern:?}: {err}"))?;
            }
        }
        Ok(())
    }
}

fn regex_body(match_query: &str) -> Option<&str> {
    if match_query.len() > 3 && match_query.starts_with("r/") && match_query.ends_with('/') {
        Some(&match_query[2..match_query.len() - 1])
    } else {
        None
    }
}
