use crate::{
    errors::ServiceError,
    handlers::common::{created_response, no_content_response},
    services::{parse_id, purchases::PurchaseRecord, sales::RecordSaleRequest},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::Response,
    routing::get,
    Router,
};

pub fn purchases_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_purchases).post(record_sale))
        .route("/item/:item_id", get(list_purchases_for_item))
        .route("/:id", get(get_purchase).delete(delete_purchase))
}

/// All purchases, newest first
#[utoipa::path(
    get,
    path = "/api/purchase",
    responses(
        (status = 200, description = "Purchases returned", body = ApiResponse<Vec<PurchaseRecord>>)
    ),
    tag = "purchases"
)]
pub async fn list_purchases(State(state): State<AppState>) -> ApiResult<Vec<PurchaseRecord>> {
    let purchases = state.services.purchases.list().await?;
    Ok(Json(ApiResponse::success(purchases)))
}

/// Record a sale: decrements stock, writes the purchase and links it to the neighbor
#[utoipa::path(
    post,
    path = "/api/purchase",
    request_body = RecordSaleRequest,
    responses(
        (status = 201, description = "Sale recorded", body = ApiResponse<PurchaseRecord>),
        (status = 400, description = "Invalid sale", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item or neighbor not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough stock", body = crate::errors::ErrorResponse)
    ),
    tag = "purchases"
)]
pub async fn record_sale(
    State(state): State<AppState>,
    Json(payload): Json<RecordSaleRequest>,
) -> Result<Response, ServiceError> {
    let purchase = state.services.sales.record_sale(payload).await?;
    Ok(created_response(purchase))
}

#[utoipa::path(
    get,
    path = "/api/purchase/{id}",
    params(("id" = String, Path, description = "Purchase id")),
    responses(
        (status = 200, description = "Purchase returned", body = ApiResponse<PurchaseRecord>),
        (status = 404, description = "Purchase not found", body = crate::errors::ErrorResponse)
    ),
    tag = "purchases"
)]
pub async fn get_purchase(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<PurchaseRecord> {
    let id = parse_id("id", &id)?;
    let purchase = state.services.purchases.get(id).await?;
    Ok(Json(ApiResponse::success(purchase)))
}

/// Purchases that took stock from an item, newest first
#[utoipa::path(
    get,
    path = "/api/purchase/item/{item_id}",
    params(("item_id" = String, Path, description = "Item id")),
    responses(
        (status = 200, description = "Purchases returned", body = ApiResponse<Vec<PurchaseRecord>>)
    ),
    tag = "purchases"
)]
pub async fn list_purchases_for_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> ApiResult<Vec<PurchaseRecord>> {
    let item_id = parse_id("item_id", &item_id)?;
    let purchases = state.services.purchases.for_item(item_id).await?;
    Ok(Json(ApiResponse::success(purchases)))
}

/// Administrative delete; stock is not restored
#[utoipa::path(
    delete,
    path = "/api/purchase/{id}",
    params(("id" = String, Path, description = "Purchase id")),
    responses(
        (status = 204, description = "Purchase deleted"),
        (status = 404, description = "Purchase not found", body = crate::errors::ErrorResponse)
    ),
    tag = "purchases"
)]
pub async fn delete_purchase(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let id = parse_id("id", &id)?;
    state.services.purchases.delete(id).await?;
    Ok(no_content_response())
}
