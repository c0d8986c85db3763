//! Browse catalog correlating images with their annotation files.

use crate::{
    models::{
        catalog::{Catalog, CatalogEntry},
        naming::{is_annotation_name, json_filename_for_image},
    },
    services::object_store::{FILE_LIST_SIZE_MAX, ObjectStore, StorageError, StorageResult},
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

/// Most annotations embedded inline in one listing.
pub const NUM_EMBEDDED_ANNOTATIONS_MAX: usize = 10;

/// Raw `start`/`end`/`embed` query values; unparsable values fall back to defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub embed: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListWindow {
    pub start: usize,
    pub end: usize,
    pub embed: usize,
}

impl From<&ListQuery> for ListWindow {
    fn from(query: &ListQuery) -> Self {
        let parse = |value: &Option<String>| value.as_deref().and_then(|v| v.trim().parse::<usize>().ok());
        Self {
            start: parse(&query.start).unwrap_or(0),
            end: parse(&query.end)
                .unwrap_or(FILE_LIST_SIZE_MAX)
                .min(FILE_LIST_SIZE_MAX),
            embed: parse(&query.embed)
                .unwrap_or(0)
                .min(NUM_EMBEDDED_ANNOTATIONS_MAX),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("No images.")]
    NoImages,
    #[error("No image annotations.")]
    NoAnnotations,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Build the catalog for the images in `window`.
///
/// Empty or missing buckets are errors rather than an empty map. The first
/// `window.embed` correlated entries, in listing order, get their JSON
/// content inline; later ones only reference the annotation key.
pub async fn build_catalog(
    store: &dyn ObjectStore,
    images_bucket: &str,
    annotations_bucket: &str,
    window: ListWindow,
) -> Result<Catalog, CatalogError> {
    let images = list_or_empty(store, images_bucket, window.end).await?;
    if images.is_empty() {
        return Err(CatalogError::NoImages);
    }
    let images: Vec<String> = images
        .into_iter()
        .skip(window.start)
        .take(window.end.saturating_sub(window.start))
        .collect();

    let annotations = list_or_empty(store, annotations_bucket, FILE_LIST_SIZE_MAX).await?;
    if annotations.is_empty() {
        return Err(CatalogError::NoAnnotations);
    }
    let annotation_names: HashSet<&str> = annotations
        .iter()
        .map(String::as_str)
        .filter(|name| is_annotation_name(name))
        .collect();

    let mut remaining_embeds = window.embed;
    let mut catalog = Catalog::default();
    for image in images {
        let json_name = json_filename_for_image(&image);
        if !annotation_names.contains(json_name.as_str()) {
            catalog.push(image, None);
            continue;
        }

        let content = if remaining_embeds > 0 {
            remaining_embeds -= 1;
            read_json(store, annotations_bucket, &json_name).await
        } else {
            None
        };
        catalog.push(
            image,
            Some(CatalogEntry {
                annotation: json_name,
                content,
            }),
        );
    }
    debug!("catalog has {} entries", catalog.len());
    Ok(catalog)
}

async fn list_or_empty(
    store: &dyn ObjectStore,
    bucket: &str,
    max_results: usize,
) -> StorageResult<Vec<String>> {
    match store.list(bucket, max_results).await {
        Ok(names) => Ok(names),
        Err(err) if err.is_not_found() => Ok(Vec::new()),
        Err(err) => Err(err),
    }
}

/// Fetch and parse a JSON object; failures are logged and read as absent.
pub async fn read_json(store: &dyn ObjectStore, bucket: &str, key: &str) -> Option<Value> {
    let content = match store.read(bucket, key).await {
        Ok(content) => content,
        Err(err) => {
            warn!("Reading {}/{} failed: {}", bucket, key, err);
            return None;
        }
    };
    parse_json(&content).or_else(|| {
        warn!("{}/{} is not valid JSON", bucket, key);
        None
    })
}

/// Empty documents (`{}`, `[]`, `null`) count as absent.
fn parse_json(content: &Bytes) -> Option<Value> {
    let value: Value = serde_json::from_slice(content).ok()?;
    let empty = match &value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    (!empty).then_some(value)
}
