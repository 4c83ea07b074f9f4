use crate::{
    entities::item,
    errors::ServiceError,
    handlers::common::{batch_response, batch_status, created_response, no_content_response},
    services::{
        edit_logs::{SaveEditsReport, SaveEditsRequest},
        items::{
            AvailableItem, CreateItemRequest, DeleteAllResult, ItemDetail, OrderRequest,
            OrderResult, UpdateCategoryRequest, UpdateItemRequest,
        },
        parse_id, BatchReport,
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteBatchRequest {
    pub ids: Vec<String>,
}

/// Creates the router for inventory item endpoints
pub fn items_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_items).post(create_item))
        .route("/available", get(list_available_items))
        .route("/order", put(place_order))
        .route("/deleteall", delete(delete_all_items))
        .route("/delete-batch", post(delete_items_batch))
        .route("/edits", post(save_item_edits))
        .route("/category/:id", put(update_item_category))
        .route("/:id", get(get_item).patch(update_item).delete(delete_item))
}

/// List all items, ordered by name
#[utoipa::path(
    get,
    path = "/api/item",
    responses(
        (status = 200, description = "Items returned", body = ApiResponse<Vec<item::Model>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "items"
)]
pub async fn list_items(State(state): State<AppState>) -> ApiResult<Vec<item::Model>> {
    let items = state.services.items.list().await?;
    Ok(Json(ApiResponse::success(items)))
}

/// Items currently in stock, as `{id, name}` pairs
#[utoipa::path(
    get,
    path = "/api/item/available",
    responses(
        (status = 200, description = "Items with stock on hand", body = ApiResponse<Vec<AvailableItem>>)
    ),
    tag = "items"
)]
pub async fn list_available_items(State(state): State<AppState>) -> ApiResult<Vec<AvailableItem>> {
    let items = state.services.items.available().await?;
    Ok(Json(ApiResponse::success(items)))
}

/// Get an item with its purchase history
#[utoipa::path(
    get,
    path = "/api/item/{id}",
    params(("id" = String, Path, description = "Item id")),
    responses(
        (status = 200, description = "Item returned", body = ApiResponse<ItemDetail>),
        (status = 400, description = "Malformed id", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "items"
)]
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ItemDetail> {
    let id = parse_id("id", &id)?;
    let item = state.services.items.get(id).await?;
    Ok(Json(ApiResponse::success(item)))
}

/// Create an item; item number and unit default to a placeholder
#[utoipa::path(
    post,
    path = "/api/item",
    request_body = CreateItemRequest,
    responses(
        (status = 201, description = "Item created", body = ApiResponse<ItemDetail>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    tag = "items"
)]
pub async fn create_item(
    State(state): State<AppState>,
    Json(payload): Json<CreateItemRequest>,
) -> Result<Response, ServiceError> {
    let item = state.services.items.create(payload).await?;
    Ok(created_response(item))
}

/// Update name, last restock quantity or current quantity
#[utoipa::path(
    patch,
    path = "/api/item/{id}",
    params(("id" = String, Path, description = "Item id")),
    request_body = UpdateItemRequest,
    responses(
        (status = 200, description = "Item updated", body = ApiResponse<item::Model>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "items"
)]
pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateItemRequest>,
) -> ApiResult<item::Model> {
    let id = parse_id("id", &id)?;
    let item = state.services.items.update(id, payload).await?;
    Ok(Json(ApiResponse::success(item)))
}

/// Administrative category change
#[utoipa::path(
    put,
    path = "/api/item/category/{id}",
    params(("id" = String, Path, description = "Item id")),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Category changed", body = ApiResponse<item::Model>),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "items"
)]
pub async fn update_item_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateCategoryRequest>,
) -> ApiResult<item::Model> {
    let id = parse_id("id", &id)?;
    let item = state.services.items.update_category(id, payload).await?;
    Ok(Json(ApiResponse::success(item)))
}

#[utoipa::path(
    delete,
    path = "/api/item/{id}",
    params(("id" = String, Path, description = "Item id")),
    responses(
        (status = 204, description = "Item deleted"),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "items"
)]
pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let id = parse_id("id", &id)?;
    state.services.items.delete(id).await?;
    Ok(no_content_response())
}

#[utoipa::path(
    delete,
    path = "/api/item/deleteall",
    responses(
        (status = 200, description = "All items deleted", body = ApiResponse<DeleteAllResult>)
    ),
    tag = "items"
)]
pub async fn delete_all_items(State(state): State<AppState>) -> ApiResult<DeleteAllResult> {
    let result = state.services.items.delete_all().await?;
    Ok(Json(ApiResponse::success(result)))
}

/// Delete several items, reporting each one separately
#[utoipa::path(
    post,
    path = "/api/item/delete-batch",
    request_body = DeleteBatchRequest,
    responses(
        (status = 200, description = "Every item deleted", body = ApiResponse<BatchReport>),
        (status = 207, description = "Some items could not be deleted", body = ApiResponse<BatchReport>)
    ),
    tag = "items"
)]
pub async fn delete_items_batch(
    State(state): State<AppState>,
    Json(payload): Json<DeleteBatchRequest>,
) -> Result<Response, ServiceError> {
    let report = state.services.items.delete_batch(payload.ids).await?;
    Ok(batch_response(batch_status(&report), report))
}

/// Bulk stock decrement; every line is checked before anything is written
#[utoipa::path(
    put,
    path = "/api/item/order",
    request_body = OrderRequest,
    responses(
        (status = 200, description = "Stock decremented", body = ApiResponse<OrderResult>),
        (status = 400, description = "Invalid order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown item", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough stock", body = crate::errors::ErrorResponse)
    ),
    tag = "items"
)]
pub async fn place_order(
    State(state): State<AppState>,
    Json(payload): Json<OrderRequest>,
) -> ApiResult<OrderResult> {
    let result = state.services.items.place_order(payload).await?;
    Ok(Json(ApiResponse::success(result)))
}

/// Manual save flow: each item is updated and logged on its own
#[utoipa::path(
    post,
    path = "/api/item/edits",
    request_body = SaveEditsRequest,
    responses(
        (status = 200, description = "Every edit saved", body = ApiResponse<SaveEditsReport>),
        (status = 207, description = "Some edits failed", body = ApiResponse<SaveEditsReport>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    tag = "items"
)]
pub async fn save_item_edits(
    State(state): State<AppState>,
    Json(payload): Json<SaveEditsRequest>,
) -> Result<Response, ServiceError> {
    let report = state.services.edit_logs.save_edits(payload).await?;
    Ok(batch_response(batch_status(&report.report), report))
}
