//! Per-target routers.
//!
//! ## annotate-http
//! - `GET|POST /annotate`, `/annotate/{*image_uri}` -> online annotation
//! - `GET /bucket/list`                          -> catalog of images and annotations
//! - `GET /bucket/imagedata/{*name}`             -> raw image bytes
//! - `GET /bucket/annotation/{*name}`            -> annotation JSON
//! - `OPTIONS` on any path                       -> CORS preflight
//!
//! ## vqa-http
//! - `POST /vqa` -> batch visual question answering
//!
//! ## annotate-gcs / vqa-gcs
//! - `POST /` -> storage-finalize CloudEvent
//!
//! Anything else answers 501.

use crate::{
    config::Target,
    handlers::{
        annotate_handlers::{
            UPLOAD_SIZE_MAX, annotate_get, annotate_get_path, annotate_post, not_supported,
        },
        bucket_handlers::{get_annotation, get_image, list_catalog},
        event_handlers::{annotate_event, vqa_event},
        vqa_handlers::answer_batch,
    },
    state::AppState,
};
use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Request},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::Response,
    routing::{MethodRouter, get, post},
};

/// Build the router serving `target`.
pub fn routes(target: Target) -> Router<AppState> {
    match target {
        Target::AnnotateHttp => annotate_http_routes(),
        Target::AnnotateGcs => event_routes(post(annotate_event)),
        Target::VqaHttp => Router::new()
            .route("/vqa", post(answer_batch).fallback(not_supported))
            .fallback(not_supported),
        Target::VqaGcs => event_routes(post(vqa_event)),
    }
}

fn annotate_http_routes() -> Router<AppState> {
    let annotate = || {
        get(annotate_get)
            .post(annotate_post)
            .fallback(not_supported)
    };
    Router::new()
        .route("/annotate", annotate())
        .route("/annotate/", annotate())
        .route(
            "/annotate/{*image_uri}",
            get(annotate_get_path)
                .post(annotate_post)
                .fallback(not_supported),
        )
        .route("/bucket/list", get(list_catalog).fallback(not_supported))
        .route(
            "/bucket/imagedata/{*name}",
            get(get_image).fallback(not_supported),
        )
        .route(
            "/bucket/annotation/{*name}",
            get(get_annotation).fallback(not_supported),
        )
        .fallback(not_supported)
        .layer(DefaultBodyLimit::max(UPLOAD_SIZE_MAX))
        .layer(middleware::from_fn(cors))
}

fn event_routes(receiver: MethodRouter<AppState>) -> Router<AppState> {
    Router::new()
        .route("/", receiver.fallback(not_supported))
        .fallback(not_supported)
}

/// Answer preflight requests on any path and allow any origin on the rest.
async fn cors(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        let headers = response.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        );
        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static("3600"),
        );
        return response;
    }

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}
