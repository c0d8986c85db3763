//! Cloud Vision `images:annotate` client.

use crate::{models::feature::Feature, services::auth::{AuthError, TokenProvider}};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::info;

/// Bounded wait for one annotation call.
pub const ANNOTATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Image handed to the Vision API.
#[derive(Clone, Debug, PartialEq)]
pub enum VisionImage {
    /// `gs://` or `https://` URI fetched by the service itself.
    Uri(String),
    /// Raw image bytes, sent base64 encoded.
    Content(Bytes),
}

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("vision request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("vision API returned {status}")]
    Api { status: u16, body: String },
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("could not encode annotation result: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Annotate one image and return the response serialized as compact JSON,
    /// or `None` when the service answered with no result.
    async fn annotate(
        &self,
        image: &VisionImage,
        features: &[Feature],
    ) -> Result<Option<String>, VisionError>;
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    requests: [AnnotateImageRequest<'a>; 1],
}

#[derive(Serialize)]
struct AnnotateImageRequest<'a> {
    image: ImagePayload,
    features: &'a [Feature],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<ImageSource>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageSource {
    image_uri: String,
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    responses: Vec<Value>,
}

impl From<&VisionImage> for ImagePayload {
    fn from(image: &VisionImage) -> Self {
        match image {
            VisionImage::Uri(uri) => Self {
                content: None,
                source: Some(ImageSource {
                    image_uri: uri.clone(),
                }),
            },
            VisionImage::Content(bytes) => Self {
                content: Some(general_purpose::STANDARD.encode(bytes)),
                source: None,
            },
        }
    }
}

pub struct CloudVisionClient {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn TokenProvider>,
}

impl CloudVisionClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }
}

#[async_trait]
impl VisionClient for CloudVisionClient {
    async fn annotate(
        &self,
        image: &VisionImage,
        features: &[Feature],
    ) -> Result<Option<String>, VisionError> {
        let body = BatchRequest {
            requests: [AnnotateImageRequest {
                image: image.into(),
                features,
            }],
        };
        info!(features = features.len(), "annotating image");

        let token = self.tokens.token().await?;
        let resp = self
            .http
            .post(format!("{}/v1/images:annotate", self.endpoint))
            .bearer_auth(token)
            .timeout(ANNOTATE_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(VisionError::Api {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let batch: BatchResponse = resp.json().await?;
        match batch.responses.into_iter().next() {
            Some(response) => Ok(Some(serde_json::to_string(&response)?)),
            None => Ok(None),
        }
    }
}

/// Whether a serialized annotation carries an API error instead of results.
pub fn is_error_result(result: &str) -> bool {
    result.contains("\"error\"") && result.contains("\"code\":")
}
