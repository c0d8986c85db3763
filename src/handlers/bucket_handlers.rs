//! Browse endpoints over the input and annotations buckets.
//!
//! - `GET /bucket/list?start=&end=&embed=` -> catalog map
//! - `GET /bucket/imagedata/{*name}`       -> raw image bytes
//! - `GET /bucket/annotation/{*name}`      -> annotation JSON

use crate::{
    errors::AppError,
    services::{
        annotation_service::read_image,
        catalog_service::{CatalogError, ListQuery, ListWindow, build_catalog, read_json},
    },
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{error, info};

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Storage(storage) => storage.into(),
            other => AppError::not_found(other.to_string()),
        }
    }
}

/// `GET /bucket/list`
pub async fn list_catalog(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    let images_bucket = state.config.input_bucket()?;
    let annotations_bucket = state.config.annotations_bucket()?;
    let window = ListWindow::from(&query);
    info!(
        "Listing {} [{}..{}), embedding up to {} annotations",
        images_bucket, window.start, window.end, window.embed
    );

    let catalog = build_catalog(
        state.store.as_ref(),
        images_bucket,
        annotations_bucket,
        window,
    )
    .await
    .inspect_err(|e| error!("{}", e))?;

    let body = serde_json::to_string_pretty(&catalog)
        .map_err(|e| AppError::internal(e.to_string()))?;
    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

/// `GET /bucket/imagedata/{*name}`
pub async fn get_image(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let images_bucket = state.config.input_bucket()?;
    let not_found = || AppError::not_found(format!("Image not found: {}", name));

    let content = match read_image(state.store.as_ref(), images_bucket, &name).await {
        Ok(Some(content)) => content,
        Ok(None) => return Err(not_found()),
        Err(err) => {
            error!("Reading {}/{} failed: {}", images_bucket, name, err);
            return Err(not_found());
        }
    };

    let disposition = format!("inline; filename=\"{}\"", download_name(&name));
    let mut response = Response::new(Body::from(content));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// `GET /bucket/annotation/{*name}`
pub async fn get_annotation(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let annotations_bucket = state.config.annotations_bucket()?;
    match read_json(state.store.as_ref(), annotations_bucket, &name).await {
        Some(content) => Ok((StatusCode::OK, Json(content))),
        None => Err(AppError::not_found(format!(
            "Annotation not found: {}",
            name
        ))),
    }
}

/// Last path segment, with quotes dropped so it fits a quoted header value.
fn download_name(key: &str) -> String {
    key.rsplit('/').next().unwrap_or(key).replace('"', "")
}
