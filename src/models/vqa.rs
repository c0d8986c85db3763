//! Visual question answering requests, persisted answers, and batch outcomes.

use serde::{Deserialize, Serialize};

pub const DEFAULT_QUESTION: &str = "What is in this image?";
pub const DEFAULT_NUMBER_OF_RESULTS: u32 = 3;
/// Upper bound on `sampleCount` accepted by the image-text model.
pub const MAX_NUMBER_OF_RESULTS: u32 = 3;

/// Body of `POST /vqa`. Without `name` every object in `bucket` is processed.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct VqaRequest {
    pub bucket: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub number_of_results: Option<u32>,
}

impl VqaRequest {
    pub fn question(&self) -> &str {
        self.question
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(DEFAULT_QUESTION)
    }

    pub fn number_of_results(&self) -> u32 {
        self.number_of_results
            .unwrap_or(DEFAULT_NUMBER_OF_RESULTS)
            .clamp(1, MAX_NUMBER_OF_RESULTS)
    }
}

/// The document written to `<basename>.txt` in the output bucket.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VqaResult {
    #[serde(rename = "File URI")]
    pub file_uri: String,
    #[serde(rename = "Prompt")]
    pub prompt: String,
    #[serde(rename = "Number of requested results")]
    pub number_of_results: u32,
    /// Candidate answers joined with `,`.
    #[serde(rename = "Responses")]
    pub responses: String,
}

impl VqaResult {
    pub fn new(file_uri: String, prompt: &str, number_of_results: u32, answers: &[String]) -> Self {
        Self {
            file_uri,
            prompt: prompt.to_string(),
            number_of_results,
            responses: answers.join(","),
        }
    }
}

/// What happened to one image of a batch.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct VqaOutcome {
    pub file_uri: String,
    /// Output key on success.
    pub output: Option<String>,
    pub error: Option<String>,
}

impl VqaOutcome {
    pub fn succeeded(file_uri: String, output: String) -> Self {
        Self {
            file_uri,
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(file_uri: String, error: impl ToString) -> Self {
        Self {
            file_uri,
            output: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct VqaBatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<VqaOutcome>,
}

impl VqaBatchReport {
    pub fn record(&mut self, outcome: VqaOutcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }
}

pub fn gs_uri(bucket: &str, name: &str) -> String {
    format!("gs://{}/{}", bucket, name)
}
