//! Storage-finalize notifications delivered as CloudEvents over HTTP.
//!
//! Binary mode carries the attributes in `ce-*` headers and the storage
//! object as the body; structured mode wraps both in one JSON document.

use axum::http::{HeaderMap, header};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents+json";

/// Payload of `google.cloud.storage.object.v1.finalized`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageObjectData {
    pub bucket: String,
    pub name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    /// The JSON API encodes sizes as decimal strings.
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub time_created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StorageEvent {
    pub id: String,
    pub event_type: String,
    pub source: Option<String>,
    pub data: StorageObjectData,
}

#[derive(Deserialize)]
struct StructuredEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    source: Option<String>,
    data: StorageObjectData,
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("missing CloudEvent attribute `{0}`")]
    MissingAttribute(&'static str),
    #[error("invalid event payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

impl StorageEvent {
    /// Decode an event from either content mode.
    pub fn from_http(headers: &HeaderMap, body: &[u8]) -> Result<Self, EventError> {
        let structured = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with(STRUCTURED_CONTENT_TYPE))
            .unwrap_or(false);

        if structured {
            let event: StructuredEvent = serde_json::from_slice(body)?;
            return Ok(Self {
                id: event.id,
                event_type: event.event_type,
                source: event.source,
                data: event.data,
            });
        }

        let attr = |name: &'static str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Ok(Self {
            id: attr("ce-id").ok_or(EventError::MissingAttribute("ce-id"))?,
            event_type: attr("ce-type").ok_or(EventError::MissingAttribute("ce-type"))?,
            source: attr("ce-source"),
            data: serde_json::from_slice(body)?,
        })
    }
}

/// How an event invocation ended, which decides whether the platform redelivers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventOutcome {
    Completed,
    /// Terminal for this event: redelivery would fail the same way.
    Aborted(String),
    /// Worth redelivering.
    Failed(String),
}
