//! Vertex AI image-text model used for visual question answering.

use crate::services::auth::{AuthError, TokenProvider};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use thiserror::Error;

const VQA_TIMEOUT: Duration = Duration::from_secs(120);
const VQA_MODEL: &str = "imagetext";

#[derive(Debug, Error)]
pub enum VqaError {
    #[error("vertex request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("vertex API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[async_trait]
pub trait VqaClient: Send + Sync {
    /// Ask `question` about the image and return up to `number_of_results` answers.
    async fn ask(
        &self,
        image: &[u8],
        question: &str,
        number_of_results: u32,
    ) -> Result<Vec<String>, VqaError>;
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: [Instance<'a>; 1],
    parameters: Parameters,
}

#[derive(Serialize)]
struct Instance<'a> {
    prompt: &'a str,
    image: InstanceImage,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InstanceImage {
    bytes_base64_encoded: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters {
    sample_count: u32,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Value>,
}

pub struct VertexVqaClient {
    http: reqwest::Client,
    endpoint: String,
    project: String,
    location: String,
    tokens: Arc<dyn TokenProvider>,
}

impl VertexVqaClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        project: impl Into<String>,
        location: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            project: project.into(),
            location: location.into(),
            tokens,
        }
    }

    fn predict_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:predict",
            self.endpoint, self.project, self.location, VQA_MODEL
        )
    }
}

#[async_trait]
impl VqaClient for VertexVqaClient {
    async fn ask(
        &self,
        image: &[u8],
        question: &str,
        number_of_results: u32,
    ) -> Result<Vec<String>, VqaError> {
        let body = PredictRequest {
            instances: [Instance {
                prompt: question,
                image: InstanceImage {
                    bytes_base64_encoded: general_purpose::STANDARD.encode(image),
                },
            }],
            parameters: Parameters {
                sample_count: number_of_results,
            },
        };

        let token = self.tokens.token().await?;
        let resp = self
            .http
            .post(self.predict_url())
            .bearer_auth(token)
            .timeout(VQA_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(VqaError::Api {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let predictions: PredictResponse = resp.json().await?;
        Ok(predictions
            .predictions
            .into_iter()
            .map(|p| match p {
                Value::String(answer) => answer,
                other => other.to_string(),
            })
            .collect())
    }
}
