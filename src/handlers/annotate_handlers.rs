//! Online annotation: `GET|POST /annotate`.
//!
//! POST accepts urlencoded forms, multipart forms (with an `image` file
//! part), or JSON. GET takes `image_uri` from the query or the path suffix.
//! In both, `features` overrides the configured feature list.

use crate::{
    errors::AppError,
    services::{
        annotation_service::resolve_features,
        vision_client::{VisionError, VisionImage, is_error_result},
    },
    state::AppState,
};
use axum::{
    Form, Json,
    body::Body,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info};

/// Largest annotation request body accepted, whatever its encoding.
pub const UPLOAD_SIZE_MAX: usize = 32 * 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
pub struct AnnotateQuery {
    pub image_uri: Option<String>,
    pub features: Option<String>,
}

/// Everything an annotation request may carry.
#[derive(Debug, Default)]
pub struct Submission {
    pub image_uri: Option<String>,
    pub file: Option<Bytes>,
    pub image_b64: Option<String>,
    pub features: Option<String>,
}

impl Submission {
    /// Pick the image source: URI, then uploaded file, then base64 field.
    pub fn image(&self) -> Result<Option<VisionImage>, AppError> {
        if let Some(uri) = non_empty(&self.image_uri) {
            return Ok(Some(VisionImage::Uri(uri.to_string())));
        }
        if let Some(file) = self.file.as_ref().filter(|f| !f.is_empty()) {
            return Ok(Some(VisionImage::Content(file.clone())));
        }
        if let Some(encoded) = non_empty(&self.image_b64) {
            return decode_base64_image(encoded).map(|bytes| Some(VisionImage::Content(bytes)));
        }
        Ok(None)
    }

    fn push_features(&mut self, value: String) {
        self.features = Some(match self.features.take() {
            Some(existing) => format!("{},{}", existing, value),
            None => value,
        });
    }

    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut submission = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "image_uri" => submission.image_uri = Some(value),
                "image" => submission.image_b64 = Some(value),
                "features" => submission.push_features(value),
                _ => {}
            }
        }
        submission
    }

    fn from_json(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        let features = match value.get("features") {
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            Some(Value::String(list)) => Some(list.clone()),
            _ => None,
        };
        Self {
            image_uri: text("image_uri"),
            file: None,
            image_b64: text("image"),
            features,
        }
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut submission = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::new(e.status(), e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let is_file = field.file_name().is_some();
            if name == "image" && is_file {
                info!(
                    "Reading image from attached file {}",
                    field.file_name().unwrap_or_default()
                );
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::new(e.status(), e.body_text()))?;
                debug!("image_bin size={}", data.len());
                submission.file = Some(data);
                continue;
            }
            let value = field
                .text()
                .await
                .map_err(|e| AppError::new(e.status(), e.body_text()))?;
            match name.as_str() {
                "image_uri" => submission.image_uri = Some(value),
                "image" => submission.image_b64 = Some(value),
                "features" => submission.push_features(value),
                _ => {}
            }
        }
        Ok(submission)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Decode a base64 form value, accepting a `data:` URL prefix.
fn decode_base64_image(encoded: &str) -> Result<Bytes, AppError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    debug!("image_b64 size={}", compact.len());
    general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map(Bytes::from)
        .map_err(|e| AppError::bad_request(format!("Invalid base64 image data: {}", e)))
}

/// `GET /annotate?image_uri=...&features=...`
pub async fn annotate_get(
    State(state): State<AppState>,
    Query(query): Query<AnnotateQuery>,
) -> Result<Response, AppError> {
    info!("Received GET args={:?}", query);
    let submission = Submission {
        image_uri: query.image_uri,
        features: query.features,
        ..Submission::default()
    };
    annotate_submission(&state, submission).await
}

/// `GET /annotate/{*image_uri}`: the URI is the rest of the path unless
/// the query names one.
pub async fn annotate_get_path(
    State(state): State<AppState>,
    Path(path_uri): Path<String>,
    Query(query): Query<AnnotateQuery>,
) -> Result<Response, AppError> {
    info!("Received GET path uri={}, args={:?}", path_uri, query);
    let image_uri = match non_empty(&query.image_uri) {
        Some(uri) => Some(uri.to_string()),
        None => Some(path_uri),
    };
    let submission = Submission {
        image_uri,
        features: query.features,
        ..Submission::default()
    };
    annotate_submission(&state, submission).await
}

/// `POST /annotate` with a form, multipart form, or JSON body.
pub async fn annotate_post(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, AppError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let submission = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::new(e.status(), e.body_text()))?;
        Submission::from_multipart(multipart).await?
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(pairs) = Form::<Vec<(String, String)>>::from_request(request, &state)
            .await
            .map_err(|e| AppError::new(e.status(), e.body_text()))?;
        Submission::from_pairs(pairs)
    } else {
        let body = axum::body::to_bytes(request.into_body(), UPLOAD_SIZE_MAX)
            .await
            .map_err(|e| AppError::new(StatusCode::PAYLOAD_TOO_LARGE, e.to_string()))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            Submission::default()
        } else {
            let Json(value) = Json::<Value>::from_bytes(&body)
                .map_err(|e| AppError::new(e.status(), e.body_text()))?;
            Submission::from_json(&value)
        }
    };
    info!(
        "Received POST image_uri={:?}, file={}, base64={}, features={:?}",
        submission.image_uri,
        submission.file.is_some(),
        submission.image_b64.is_some(),
        submission.features
    );
    annotate_submission(&state, submission).await
}

/// Resolve image + features, call the Vision API, and shape the response.
pub async fn annotate_submission(
    state: &AppState,
    submission: Submission,
) -> Result<Response, AppError> {
    let Some(image) = submission.image()? else {
        return Err(AppError::precondition_failed("No image data"));
    };
    let features = resolve_features(
        state.config.features.as_deref(),
        submission.features.as_deref(),
    );
    info!("Annotating for features: {:?}", features);
    match &image {
        VisionImage::Uri(uri) => info!("Annotating image from URI {}", uri),
        VisionImage::Content(bytes) => info!("Annotating uploaded image, {} bytes", bytes.len()),
    }

    match state.vision.annotate(&image, &features).await {
        Ok(Some(result)) if is_error_result(&result) => {
            error!("Vision API returned error, check JSON result for details.");
            Ok(json_response(StatusCode::PRECONDITION_FAILED, result))
        }
        Ok(Some(result)) => {
            info!("Returning annotation result as JSON.");
            Ok(json_response(StatusCode::OK, result))
        }
        Ok(None) => {
            error!("Annotation result is None.");
            Err(AppError::internal("Annotation result is None."))
        }
        Err(VisionError::Api { status: 400, body }) if is_error_result(&body) => {
            error!("Vision API rejected the request as invalid.");
            Ok(json_response(StatusCode::PRECONDITION_FAILED, body))
        }
        Err(err) => {
            error!("Annotation failed: {}", err);
            Err(AppError::internal(err.to_string()))
        }
    }
}

/// Serialized JSON passed through verbatim.
fn json_response(status: StatusCode, body: String) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// Any method other than GET/POST on the annotation routes.
pub async fn not_supported() -> impl IntoResponse {
    (StatusCode::NOT_IMPLEMENTED, "Not supported.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_wins_over_file_and_base64() {
        let submission = Submission {
            image_uri: Some("gs://b/cat.jpg".into()),
            file: Some(Bytes::from_static(b"file")),
            image_b64: Some("aW1n".into()),
            features: None,
        };
        assert_eq!(
            submission.image().unwrap(),
            Some(VisionImage::Uri("gs://b/cat.jpg".into()))
        );
    }

    #[test]
    fn file_wins_over_base64() {
        let submission = Submission {
            image_uri: Some("  ".into()),
            file: Some(Bytes::from_static(b"file")),
            image_b64: Some("aW1n".into()),
            features: None,
        };
        assert_eq!(
            submission.image().unwrap(),
            Some(VisionImage::Content(Bytes::from_static(b"file")))
        );
    }

    #[test]
    fn base64_field_is_decoded() {
        let submission = Submission {
            image_b64: Some("data:image/png;base64,aW1n".into()),
            ..Submission::default()
        };
        assert_eq!(
            submission.image().unwrap(),
            Some(VisionImage::Content(Bytes::from_static(b"img")))
        );

        let invalid = Submission {
            image_b64: Some("***".into()),
            ..Submission::default()
        };
        assert_eq!(invalid.image().unwrap_err().status, StatusCode::BAD_REQUEST);
        assert_eq!(Submission::default().image().unwrap(), None);
    }

    #[test]
    fn json_features_may_be_a_list() {
        let value = serde_json::json!({
            "image_uri": "gs://b/x.jpg",
            "features": ["LABEL_DETECTION", "TEXT_DETECTION"]
        });
        let submission = Submission::from_json(&value);
        assert_eq!(
            submission.features.as_deref(),
            Some("LABEL_DETECTION,TEXT_DETECTION")
        );
        assert_eq!(submission.image_uri.as_deref(), Some("gs://b/x.jpg"));
    }

    #[test]
    fn repeated_form_features_are_joined() {
        let submission = Submission::from_pairs(vec![
            ("features".into(), "LABEL_DETECTION".into()),
            ("features".into(), "FACE_DETECTION".into()),
            ("image".into(), "aW1n".into()),
        ]);
        assert_eq!(
            submission.features.as_deref(),
            Some("LABEL_DETECTION,FACE_DETECTION")
        );
        assert_eq!(submission.image_b64.as_deref(), Some("aW1n"));
    }
}
