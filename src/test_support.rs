//! Fakes and fixtures shared by the unit tests.

use crate::{
    config::{AppConfig, test_config},
    models::feature::Feature,
    services::{
        local_store::LocalStore,
        object_store::ObjectStore,
        vision_client::{VisionClient, VisionError, VisionImage},
        vqa_client::{VqaClient, VqaError},
    },
    state::AppState,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const IMAGES: &str = "images";
pub const ANNOTATIONS: &str = "annotations";
pub const ANSWERS: &str = "answers";

#[derive(Clone, Debug)]
pub enum VisionReply {
    Json(String),
    Empty,
    ApiError(u16, String),
}

/// Records every call and answers with a canned reply.
pub struct FakeVision {
    pub reply: VisionReply,
    pub calls: Mutex<Vec<(VisionImage, Vec<Feature>)>>,
}

impl FakeVision {
    pub fn replying(reply: VisionReply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(VisionImage, Vec<Feature>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionClient for FakeVision {
    async fn annotate(
        &self,
        image: &VisionImage,
        features: &[Feature],
    ) -> Result<Option<String>, VisionError> {
        self.calls
            .lock()
            .unwrap()
            .push((image.clone(), features.to_vec()));
        match &self.reply {
            VisionReply::Json(text) => Ok(Some(text.clone())),
            VisionReply::Empty => Ok(None),
            VisionReply::ApiError(status, body) => Err(VisionError::Api {
                status: *status,
                body: body.clone(),
            }),
        }
    }
}

/// Answers every question with fixed answers; images whose bytes are
/// `b"bad"` fail.
pub struct FakeVqa {
    pub answers: Vec<String>,
    pub questions: Mutex<Vec<(String, u32)>>,
}

impl FakeVqa {
    pub fn answering(answers: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            questions: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl VqaClient for FakeVqa {
    async fn ask(
        &self,
        image: &[u8],
        question: &str,
        number_of_results: u32,
    ) -> Result<Vec<String>, VqaError> {
        self.questions
            .lock()
            .unwrap()
            .push((question.to_string(), number_of_results));
        if image == b"bad" {
            return Err(VqaError::Api {
                status: 400,
                body: "unreadable image".into(),
            });
        }
        Ok(self.answers.clone())
    }
}

/// A local store in a temp dir with the three standard buckets created.
pub struct Fixture {
    /// Removed on drop, taking the buckets with it.
    _dir: TempDir,
    pub store: Arc<LocalStore>,
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::new(dir.path()));
        for bucket in [IMAGES, ANNOTATIONS, ANSWERS] {
            store.create_bucket(bucket).await.unwrap();
        }
        Self { _dir: dir, store }
    }

    pub async fn put(&self, bucket: &str, key: &str, content: &[u8]) {
        self.store
            .write(bucket, key, "application/octet-stream", Bytes::copy_from_slice(content))
            .await
            .unwrap();
    }

    pub async fn get(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.store.read(bucket, key).await.ok()
    }

    pub fn state(&self, vision: Arc<FakeVision>, vqa: Arc<FakeVqa>) -> AppState {
        self.state_with(test_config(), vision, vqa)
    }

    pub fn state_with(
        &self,
        config: AppConfig,
        vision: Arc<FakeVision>,
        vqa: Arc<FakeVqa>,
    ) -> AppState {
        AppState::new(config, self.store.clone(), vision, vqa)
    }
}
