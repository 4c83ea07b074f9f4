use crate::{services::BatchReport, ApiResponse};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// Standard no content response
pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// 200 when every entry went through, 207 Multi-Status when at least one failed.
pub fn batch_status(report: &BatchReport) -> StatusCode {
    if report.has_failures() {
        StatusCode::MULTI_STATUS
    } else {
        StatusCode::OK
    }
}

pub fn batch_response<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(ApiResponse::success(data))).into_response()
}
