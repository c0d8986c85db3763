use crate::{
    errors::AppError, models::vqa::VqaRequest, services::vqa_service::run_batch, state::AppState,
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

/// `POST /vqa`: answer one question for a single image or a whole bucket.
///
/// 200 when every image was answered, 207 when some were, 500 when none were.
pub async fn answer_batch(
    State(state): State<AppState>,
    Json(request): Json<VqaRequest>,
) -> Result<impl IntoResponse, AppError> {
    let report = run_batch(&state, &request).await?;
    info!(
        "VQA batch on {}: {} succeeded, {} failed",
        request.bucket, report.succeeded, report.failed
    );
    let status = match (report.succeeded, report.failed) {
        (_, 0) => StatusCode::OK,
        (0, _) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::MULTI_STATUS,
    };
    Ok((status, Json(report)))
}
