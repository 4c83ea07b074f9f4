use crate::{db, errors::ServiceError, ApiResponse, ApiResult, AppState};
use axum::extract::{Json, State};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthReport {
    pub status: String,
    pub database: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusReport {
    pub status: String,
    pub service: String,
    pub version: String,
    pub environment: String,
    pub timestamp: String,
}

/// Liveness plus a database ping. Fails with 503 when the database is unreachable.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and database are up", body = ApiResponse<HealthReport>),
        (status = 503, description = "Database unreachable", body = crate::errors::ErrorResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> ApiResult<HealthReport> {
    db::check_connection(&state.db).await?;
    Ok(Json(ApiResponse::success(HealthReport {
        status: "healthy".to_string(),
        database: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })))
}

#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Build and environment information", body = ApiResponse<StatusReport>)
    ),
    tag = "health"
)]
pub async fn api_status(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<StatusReport>>, ServiceError> {
    Ok(Json(ApiResponse::success(StatusReport {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.environment.clone(),
        timestamp: Utc::now().to_rfc3339(),
    })))
}
