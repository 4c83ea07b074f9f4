use crate::{
    entities::neighbor,
    errors::ServiceError,
    handlers::common::{created_response, no_content_response},
    services::{
        neighbors::{
            CreateNeighborRequest, LegacyImportReport, LegacyNeighbor, NeighborDetail,
            NeighborFilter,
        },
        parse_id,
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct NeighborHistoryResponse {
    pub neighbor_id: Uuid,
    pub history: Vec<Uuid>,
}

/// Mounted at both `/neighbor` and `/neighbors`.
pub fn neighbors_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_neighbors).post(create_neighbor))
        .route("/import-legacy", post(import_legacy_neighbors))
        .route("/:id", get(get_neighbor).delete(delete_neighbor))
        .route("/:id/history", get(get_neighbor_history))
}

/// List neighbors, optionally filtered by exact gender, age or zipcode
#[utoipa::path(
    get,
    path = "/api/neighbors",
    params(NeighborFilter),
    responses(
        (status = 200, description = "Neighbors returned", body = ApiResponse<Vec<neighbor::Model>>)
    ),
    tag = "neighbors"
)]
pub async fn list_neighbors(
    State(state): State<AppState>,
    Query(filter): Query<NeighborFilter>,
) -> ApiResult<Vec<neighbor::Model>> {
    let neighbors = state.services.neighbors.list(filter).await?;
    Ok(Json(ApiResponse::success(neighbors)))
}

#[utoipa::path(
    get,
    path = "/api/neighbors/{id}",
    params(("id" = String, Path, description = "Neighbor id")),
    responses(
        (status = 200, description = "Neighbor returned", body = ApiResponse<NeighborDetail>),
        (status = 404, description = "Neighbor not found", body = crate::errors::ErrorResponse)
    ),
    tag = "neighbors"
)]
pub async fn get_neighbor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<NeighborDetail> {
    let id = parse_id("id", &id)?;
    let neighbor = state.services.neighbors.get(id).await?;
    Ok(Json(ApiResponse::success(neighbor)))
}

/// Purchase ids of a neighbor, in the order they were recorded
#[utoipa::path(
    get,
    path = "/api/neighbors/{id}/history",
    params(("id" = String, Path, description = "Neighbor id")),
    responses(
        (status = 200, description = "History returned", body = ApiResponse<NeighborHistoryResponse>),
        (status = 404, description = "Neighbor not found", body = crate::errors::ErrorResponse)
    ),
    tag = "neighbors"
)]
pub async fn get_neighbor_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<NeighborHistoryResponse> {
    let id = parse_id("id", &id)?;
    let history = state.services.neighbors.history(id).await?;
    Ok(Json(ApiResponse::success(NeighborHistoryResponse {
        neighbor_id: id,
        history,
    })))
}

#[utoipa::path(
    post,
    path = "/api/neighbors",
    request_body = CreateNeighborRequest,
    responses(
        (status = 201, description = "Neighbor registered", body = ApiResponse<NeighborDetail>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    tag = "neighbors"
)]
pub async fn create_neighbor(
    State(state): State<AppState>,
    Json(payload): Json<CreateNeighborRequest>,
) -> Result<Response, ServiceError> {
    let neighbor = state.services.neighbors.create(payload).await?;
    Ok(created_response(neighbor))
}

#[utoipa::path(
    delete,
    path = "/api/neighbors/{id}",
    params(("id" = String, Path, description = "Neighbor id")),
    responses(
        (status = 204, description = "Neighbor deleted"),
        (status = 404, description = "Neighbor not found", body = crate::errors::ErrorResponse)
    ),
    tag = "neighbors"
)]
pub async fn delete_neighbor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let id = parse_id("id", &id)?;
    state.services.neighbors.delete(id).await?;
    Ok(no_content_response())
}

/// Import records in the legacy `{Gender, Age, Zipcode, History}` shape
#[utoipa::path(
    post,
    path = "/api/neighbors/import-legacy",
    request_body = Vec<LegacyNeighbor>,
    responses(
        (status = 200, description = "Records imported", body = ApiResponse<LegacyImportReport>),
        (status = 400, description = "A record is invalid; nothing was imported", body = crate::errors::ErrorResponse)
    ),
    tag = "neighbors"
)]
pub async fn import_legacy_neighbors(
    State(state): State<AppState>,
    Json(records): Json<Vec<LegacyNeighbor>>,
) -> ApiResult<LegacyImportReport> {
    let report = state.services.neighbors.import_legacy(records).await?;
    Ok(Json(ApiResponse::success(report)))
}
