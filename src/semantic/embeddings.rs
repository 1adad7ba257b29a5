//! Client for the remote multimodal embedding service.
//!
//! Text and images share one vector space, so a text query can be scored
//! against page screenshots directly.

use serde::{Deserialize, Serialize};

use crate::config::{EmbeddingConfig, ImageConfig};
use crate::images::{self, EncodingError};

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingApiError {
    #[error("no API key configured")]
    MissingCredentials,

    #[error("nothing to embed")]
    EmptyInput,

    #[error("request failed: {0}")]
    Http(String),

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    MalformedResponse(String),

    #[error("expected {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("image could not be prepared: {0}")]
    Image(#[from] EncodingError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

/// A vector together with what it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    pub modality: Modality,
    /// URL of the item, or `"query"`
    pub owner: String,
    pub values: Vec<f32>,
}

impl EmbeddingVector {
    pub fn new(modality: Modality, owner: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            modality,
            owner: owner.into(),
            values,
        }
    }

    pub fn check_dimensions(&self, expected: usize) -> Result<(), EmbeddingApiError> {
        if self.values.len() == expected {
            Ok(())
        } else {
            Err(EmbeddingApiError::DimensionMismatch {
                expected,
                actual: self.values.len(),
            })
        }
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

/// Anything that can embed text and images into the shared space. Failures
/// are reported as `None`.
pub trait Embedder: Send + Sync {
    fn embed_text(&self, text: &str) -> Option<Vec<f32>>;

    /// `image` is a URL, a data URI or raw base64.
    fn embed_image(&self, image: &str) -> Option<Vec<f32>>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: EmbeddingInput<'a>,
    parameters: EmbeddingParameters,
}

#[derive(Serialize)]
struct EmbeddingInput<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum Content<'a> {
    Text(&'a str),
    Image(&'a str),
}

#[derive(Serialize)]
struct EmbeddingParameters {
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    output: Option<EmbeddingOutput>,
}

#[derive(Deserialize)]
struct EmbeddingOutput {
    #[serde(default)]
    embeddings: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Option<Vec<f32>>,
}

pub struct EmbeddingClient {
    config: EmbeddingConfig,
    images: ImageConfig,
    user_agent: String,
    client: reqwest::blocking::Client,
}

impl EmbeddingClient {
    pub fn new(
        config: EmbeddingConfig,
        images: ImageConfig,
        user_agent: impl Into<String>,
    ) -> Result<Self, EmbeddingApiError> {
        let user_agent = user_agent.into();
        let client = crate::scrape::http_client(&user_agent, config.request_timeout())
            .map_err(|e| EmbeddingApiError::Http(crate::scrape::get_error(&e)))?;

        Ok(Self {
            config,
            images,
            user_agent,
            client,
        })
    }

    pub fn try_embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingApiError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmbeddingApiError::EmptyInput);
        }
        self.request(Content::Text(text))
    }

    pub fn try_embed_image(&self, image: &str) -> Result<Vec<f32>, EmbeddingApiError> {
        let image = image.trim();
        if image.is_empty() {
            return Err(EmbeddingApiError::EmptyInput);
        }

        let data_uri = if image.starts_with("http://") || image.starts_with("https://") {
            images::prepare_remote_image(image, &self.images, &self.user_agent)?
        } else {
            images::ensure_data_uri(image)
        };

        self.request(Content::Image(&data_uri))
    }

    fn request(&self, content: Content) -> Result<Vec<f32>, EmbeddingApiError> {
        let api_key = self
            .config
            .api_key()
            .ok_or(EmbeddingApiError::MissingCredentials)?;

        let body = build_request(&self.config, content);

        let resp = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .map_err(|e| EmbeddingApiError::Http(crate::scrape::get_error(&e)))?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| EmbeddingApiError::Http(crate::scrape::get_error(&e)))?;

        if !status.is_success() {
            return Err(EmbeddingApiError::Status {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        parse_response(&text, self.config.dimensions)
    }
}

impl Embedder for EmbeddingClient {
    fn embed_text(&self, text: &str) -> Option<Vec<f32>> {
        self.try_embed_text(text)
            .map_err(|err| log::warn!("text embedding failed: {err}"))
            .ok()
    }

    fn embed_image(&self, image: &str) -> Option<Vec<f32>> {
        self.try_embed_image(image)
            .map_err(|err| {
                let shown: String = image.chars().take(80).collect();
                log::warn!("image embedding failed for {shown}: {err}");
            })
            .ok()
    }
}

fn build_request<'a>(config: &'a EmbeddingConfig, content: Content<'a>) -> EmbeddingRequest<'a> {
    EmbeddingRequest {
        model: &config.model,
        input: EmbeddingInput {
            contents: [content],
        },
        parameters: EmbeddingParameters {
            dimensions: config.dimensions,
        },
    }
}

fn parse_response(body: &str, expected: usize) -> Result<Vec<f32>, EmbeddingApiError> {
    let resp: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| EmbeddingApiError::MalformedResponse(e.to_string()))?;

    let values = resp
        .output
        .and_then(|out| out.embeddings.into_iter().next())
        .and_then(|item| item.embedding)
        .ok_or_else(|| EmbeddingApiError::MalformedResponse("no embedding in output".into()))?;

    if values.len() != expected {
        return Err(EmbeddingApiError::DimensionMismatch {
            expected,
            actual: values.len(),
        });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(EmbeddingApiError::MalformedResponse(
            "embedding contains non-finite values".into(),
        ));
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_shape() {
        let config = EmbeddingConfig::default();
        let body = serde_json::to_value(build_request(&config, Content::Text("hello"))).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "qwen2.5-vl-embedding",
                "input": {"contents": [{"text": "hello"}]},
                "parameters": {"dimensions": 1024}
            })
        );

        let body =
            serde_json::to_value(build_request(&config, Content::Image("data:image/jpeg;base64,AA")))
                .unwrap();
        assert_eq!(body["input"]["contents"][0]["image"], "data:image/jpeg;base64,AA");
    }

    #[test]
    fn parses_first_embedding() {
        let body = r#"{"output":{"embeddings":[{"index":0,"embedding":[0.1,0.2,0.3]}]},"usage":{}}"#;
        assert_eq!(parse_response(body, 3).unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn rejects_wrong_dimensions() {
        let body = r#"{"output":{"embeddings":[{"embedding":[0.1,0.2]}]}}"#;
        assert!(matches!(
            parse_response(body, 3),
            Err(EmbeddingApiError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn rejects_non_finite_values() {
        let body = r#"{"output":{"embeddings":[{"embedding":[1e39,0.2]}]}}"#;
        assert!(matches!(
            parse_response(body, 2),
            Err(EmbeddingApiError::MalformedResponse(_))
        ));
    }

    #[test]
    fn rejects_missing_output() {
        for body in [r#"{"code":"InvalidApiKey"}"#, r#"{"output":{"embeddings":[]}}"#, "nope"] {
            assert!(matches!(
                parse_response(body, 3),
                Err(EmbeddingApiError::MalformedResponse(_))
            ));
        }
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let config = EmbeddingConfig {
            api_key: None,
            endpoint: "http://127.0.0.1:9/".to_string(),
            ..Default::default()
        };
        let client = EmbeddingClient::new(config, ImageConfig::default(), "test").unwrap();
        assert!(matches!(
            client.try_embed_text("hello"),
            Err(EmbeddingApiError::MissingCredentials)
        ));
        assert_eq!(client.embed_text("hello"), None);
    }

    #[test]
    fn empty_input_is_rejected() {
        let client =
            EmbeddingClient::new(EmbeddingConfig::default(), ImageConfig::default(), "test").unwrap();
        assert!(matches!(client.try_embed_text("  "), Err(EmbeddingApiError::EmptyInput)));
        assert!(matches!(client.try_embed_image(""), Err(EmbeddingApiError::EmptyInput)));
    }

    #[test]
    fn vector_dimension_check() {
        let v = EmbeddingVector::new(Modality::Text, "query", vec![0.0; 4]);
        assert!(v.check_dimensions(4).is_ok());
        assert!(v.check_dimensions(1024).is_err());
    }
}
