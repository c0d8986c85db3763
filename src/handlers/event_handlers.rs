//! CloudEvent receivers for storage-finalize notifications.
//!
//! The status code is the acknowledgement: 2xx stops redelivery, 5xx asks
//! the platform to retry.

use crate::{
    models::event::{EventOutcome, StorageEvent},
    services::{annotation_service::annotate_stored_image, vqa_service::answer_stored_image},
    state::AppState,
};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::{error, warn};

/// `POST /` for the `annotate-gcs` target.
pub async fn annotate_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    match StorageEvent::from_http(&headers, &body) {
        Ok(event) => acknowledge(annotate_stored_image(&state, &event).await),
        Err(err) => reject(err),
    }
}

/// `POST /` for the `vqa-gcs` target.
pub async fn vqa_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    match StorageEvent::from_http(&headers, &body) {
        Ok(event) => acknowledge(answer_stored_image(&state, &event).await),
        Err(err) => reject(err),
    }
}

fn acknowledge(outcome: EventOutcome) -> StatusCode {
    match outcome {
        EventOutcome::Completed => StatusCode::NO_CONTENT,
        EventOutcome::Aborted(reason) => {
            warn!("Event dropped: {}", reason);
            StatusCode::NO_CONTENT
        }
        EventOutcome::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: impl std::fmt::Display) -> StatusCode {
    error!("Undecodable event: {}", err);
    StatusCode::BAD_REQUEST
}
