use anyhow::Result;
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
#[cfg(test)]
mod test_support;

use config::{AppConfig, StorageBackend};
use services::{
    auth::{MetadataTokenProvider, StaticTokenProvider, TokenProvider},
    gcs_store::GcsStore,
    local_store::LocalStore,
    object_store::ObjectStore,
    vision_client::CloudVisionClient,
    vqa_client::VertexVqaClient,
};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = AppConfig::from_env_and_args()?;

    // --- Logging setup (disabled unless LOG_LEVEL is set) ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cfg.log_filter()))
        .init();

    tracing::info!("Starting {} with config: {:?}", cfg.target, redacted(&cfg));
    cfg.validate_for_target()?;

    // --- Shared clients ---
    let http = reqwest::Client::builder().build()?;
    let tokens: Arc<dyn TokenProvider> = match &cfg.access_token {
        Some(token) => Arc::new(StaticTokenProvider::new(token.clone())),
        None => Arc::new(MetadataTokenProvider::new(http.clone())),
    };

    let store: Arc<dyn ObjectStore> = match cfg.storage_backend {
        StorageBackend::Gcs => Arc::new(GcsStore::new(
            http.clone(),
            cfg.storage_endpoint.clone(),
            tokens.clone(),
        )),
        StorageBackend::Local => {
            let local = LocalStore::new(cfg.local_storage_dir.clone());
            let configured = [&cfg.input_bucket, &cfg.annotations_bucket, &cfg.output_bucket];
            for bucket in configured.into_iter().flatten() {
                local.create_bucket(bucket).await?;
            }
            tracing::info!(
                "Serving buckets from {}",
                cfg.local_storage_dir.display()
            );
            Arc::new(local)
        }
    };
    let vision = Arc::new(CloudVisionClient::new(
        http.clone(),
        cfg.vision_endpoint.clone(),
        tokens.clone(),
    ));
    let vqa = Arc::new(VertexVqaClient::new(
        http,
        cfg.vertex_endpoint.clone(),
        cfg.gcp_project.clone().unwrap_or_default(),
        cfg.gcp_location.clone(),
        tokens,
    ));

    // --- Build router ---
    let target = cfg.target;
    let state = AppState::new(cfg.clone(), store, vision, vqa);
    let app: Router = routes::routes::routes(target).with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Config for logging, without the bearer token.
fn redacted(cfg: &AppConfig) -> AppConfig {
    let mut cfg = cfg.clone();
    if cfg.access_token.is_some() {
        cfg.access_token = Some("<redacted>".into());
    }
    cfg
}
