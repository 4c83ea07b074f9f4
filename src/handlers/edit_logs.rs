use crate::{
    errors::ServiceError,
    handlers::common::{created_response, no_content_response},
    services::{
        edit_logs::{CreateEditLogRequest, EditLogRecord},
        parse_id,
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::Response,
    routing::get,
    Router,
};

pub fn edit_logs_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_edit_logs).post(create_edit_log))
        .route("/:id", get(get_edit_log).delete(delete_edit_log))
}

#[utoipa::path(
    get,
    path = "/api/editLog",
    responses(
        (status = 200, description = "Edit logs, newest first", body = ApiResponse<Vec<EditLogRecord>>)
    ),
    tag = "edit-logs"
)]
pub async fn list_edit_logs(State(state): State<AppState>) -> ApiResult<Vec<EditLogRecord>> {
    let logs = state.services.edit_logs.list().await?;
    Ok(Json(ApiResponse::success(logs)))
}

/// Record a single change; the before-image is read from the stored item, which is left untouched
#[utoipa::path(
    post,
    path = "/api/editLog",
    request_body = CreateEditLogRequest,
    responses(
        (status = 201, description = "Edit log created", body = ApiResponse<EditLogRecord>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "edit-logs"
)]
pub async fn create_edit_log(
    State(state): State<AppState>,
    Json(payload): Json<CreateEditLogRequest>,
) -> Result<Response, ServiceError> {
    let log = state.services.edit_logs.create(payload).await?;
    Ok(created_response(log))
}

#[utoipa::path(
    get,
    path = "/api/editLog/{id}",
    params(("id" = String, Path, description = "Edit log id")),
    responses(
        (status = 200, description = "Edit log returned", body = ApiResponse<EditLogRecord>),
        (status = 404, description = "Edit log not found", body = crate::errors::ErrorResponse)
    ),
    tag = "edit-logs"
)]
pub async fn get_edit_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<EditLogRecord> {
    let id = parse_id("id", &id)?;
    let log = state.services.edit_logs.get(id).await?;
    Ok(Json(ApiResponse::success(log)))
}

#[utoipa::path(
    delete,
    path = "/api/editLog/{id}",
    params(("id" = String, Path, description = "Edit log id")),
    responses(
        (status = 204, description = "Edit log deleted"),
        (status = 404, description = "Edit log not found", body = crate::errors::ErrorResponse)
    ),
    tag = "edit-logs"
)]
pub async fn delete_edit_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let id = parse_id("id", &id)?;
    state.services.edit_logs.delete(id).await?;
    Ok(no_content_response())
}
