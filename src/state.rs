use crate::{
    config::AppConfig,
    services::{object_store::ObjectStore, vision_client::VisionClient, vqa_client::VqaClient},
};
use std::sync::Arc;

/// Clients built once at startup and shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ObjectStore>,
    pub vision: Arc<dyn VisionClient>,
    pub vqa: Arc<dyn VqaClient>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ObjectStore>,
        vision: Arc<dyn VisionClient>,
        vqa: Arc<dyn VqaClient>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            vision,
            vqa,
        }
    }
}
