//! Google Cloud Storage over the JSON API.

use crate::services::{
    auth::TokenProvider,
    object_store::{ObjectStore, StorageError, StorageResult},
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Response, StatusCode, header};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Cloud Storage caps a single listing page at 1000 items.
const LIST_PAGE_SIZE: usize = 1000;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    items: Vec<ListItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ListItem {
    name: String,
}

#[derive(Clone)]
pub struct GcsStore {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn TokenProvider>,
}

impl GcsStore {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint,
            urlencoding::encode(bucket),
            urlencoding::encode(key)
        )
    }
}

/// Map a non-success response onto the storage error taxonomy.
async fn check(
    resp: Response,
    bucket: &str,
    not_found: impl FnOnce() -> StorageError,
) -> StorageResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match status {
        StatusCode::NOT_FOUND => Err(not_found()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(StorageError::PermissionDenied(bucket.to_string()))
        }
        _ => Err(StorageError::Upstream {
            status: status.as_u16(),
            message: resp.text().await.unwrap_or_default(),
        }),
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn read(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let token = self.tokens.token().await?;
        let resp = self
            .http
            .get(self.object_url(bucket, key))
            .query(&[("alt", "media")])
            .bearer_auth(token)
            .send()
            .await?;
        let resp = check(resp, bucket, || StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
        .await?;
        Ok(resp.bytes().await?)
    }

    async fn write(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        content: Bytes,
    ) -> StorageResult<()> {
        let token = self.tokens.token().await?;
        let url = format!(
            "{}/upload/storage/v1/b/{}/o",
            self.endpoint,
            urlencoding::encode(bucket)
        );
        let size = content.len();
        let resp = self
            .http
            .post(url)
            .query(&[("uploadType", "media"), ("name", key)])
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, content_type)
            .body(content)
            .send()
            .await?;
        check(resp, bucket, || StorageError::BucketNotFound(bucket.to_string())).await?;
        debug!("uploaded {} bytes to gs://{}/{}", size, bucket, key);
        Ok(())
    }

    async fn list(&self, bucket: &str, max_results: usize) -> StorageResult<Vec<String>> {
        let url = format!("{}/storage/v1/b/{}/o", self.endpoint, urlencoding::encode(bucket));
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        while names.len() < max_results {
            let token = self.tokens.token().await?;
            let page_size = (max_results - names.len()).min(LIST_PAGE_SIZE);
            let mut request = self
                .http
                .get(&url)
                .query(&[
                    ("maxResults", page_size.to_string()),
                    ("fields", "items(name),nextPageToken".to_string()),
                ])
                .bearer_auth(token);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page)]);
            }

            let resp = check(request.send().await?, bucket, || {
                StorageError::BucketNotFound(bucket.to_string())
            })
            .await?;
            let page: ListPage = resp.json().await?;
            names.extend(page.items.into_iter().map(|item| item.name));

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        names.truncate(max_results);
        Ok(names)
    }
}
