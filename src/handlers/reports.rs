//! Dashboard widgets and longer-range reports. All endpoints are read-only.

use crate::{
    services::reports::{
        AgeReport, DateRangeQuery, ForecastReport, GenderReport, LowStockReport, NeighborCount,
        PopularItemReport, SeasonReport, UnitsReport, VisitsReport,
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Json, Query, State},
    routing::get,
    Router,
};

/// Window-based widgets; each accepts `start_date`/`end_date` (or `startDate`/`endDate`).
pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/weekly-neighbors", get(weekly_neighbors))
        .route("/popular-items", get(popular_items))
        .route("/low-stock-items", get(low_stock_items))
        .route("/weekly-visits", get(weekly_visits))
        .route("/total-units-taken", get(total_units_taken))
}

pub fn reports_routes() -> Router<AppState> {
    Router::new()
        .route("/items-weekly", get(items_weekly))
        .route("/items-by-season", get(items_by_season))
        .route("/gender-distribution", get(gender_distribution))
        .route("/age-distribution", get(age_distribution))
        .route("/forecast", get(forecast))
}

/// Distinct neighbors with at least one purchase in the window
#[utoipa::path(
    get,
    path = "/api/dashboard/weekly-neighbors",
    params(DateRangeQuery),
    responses(
        (status = 200, description = "Neighbor count", body = ApiResponse<NeighborCount>),
        (status = 400, description = "Malformed date", body = crate::errors::ErrorResponse)
    ),
    tag = "dashboard"
)]
pub async fn weekly_neighbors(
    State(state): State<AppState>,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<NeighborCount> {
    let report = state.services.reports.weekly_neighbors(range).await?;
    Ok(Json(ApiResponse::success(report)))
}

/// Top item in the window with its per-day series
#[utoipa::path(
    get,
    path = "/api/dashboard/popular-items",
    params(DateRangeQuery),
    responses(
        (status = 200, description = "Top item; name is null when nothing was taken", body = ApiResponse<PopularItemReport>),
        (status = 400, description = "Malformed date", body = crate::errors::ErrorResponse)
    ),
    tag = "dashboard"
)]
pub async fn popular_items(
    State(state): State<AppState>,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<PopularItemReport> {
    let report = state.services.reports.popular_items(range).await?;
    Ok(Json(ApiResponse::success(report)))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/low-stock-items",
    responses(
        (status = 200, description = "Items below their restock threshold", body = ApiResponse<LowStockReport>)
    ),
    tag = "dashboard"
)]
pub async fn low_stock_items(State(state): State<AppState>) -> ApiResult<LowStockReport> {
    let report = state.services.reports.low_stock_items().await?;
    Ok(Json(ApiResponse::success(report)))
}

/// Purchases per day, one entry for every day of the window
#[utoipa::path(
    get,
    path = "/api/dashboard/weekly-visits",
    params(DateRangeQuery),
    responses(
        (status = 200, description = "Daily visit counts", body = ApiResponse<VisitsReport>),
        (status = 400, description = "Malformed date", body = crate::errors::ErrorResponse)
    ),
    tag = "dashboard"
)]
pub async fn weekly_visits(
    State(state): State<AppState>,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<VisitsReport> {
    let report = state.services.reports.weekly_visits(range).await?;
    Ok(Json(ApiResponse::success(report)))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/total-units-taken",
    params(DateRangeQuery),
    responses(
        (status = 200, description = "Units taken in the window", body = ApiResponse<UnitsReport>),
        (status = 400, description = "Malformed date", body = crate::errors::ErrorResponse)
    ),
    tag = "dashboard"
)]
pub async fn total_units_taken(
    State(state): State<AppState>,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<UnitsReport> {
    let report = state.services.reports.total_units_taken(range).await?;
    Ok(Json(ApiResponse::success(report)))
}

#[utoipa::path(
    get,
    path = "/api/reports/items-weekly",
    responses(
        (status = 200, description = "Distinct neighbors served this week", body = ApiResponse<NeighborCount>)
    ),
    tag = "reports"
)]
pub async fn items_weekly(State(state): State<AppState>) -> ApiResult<NeighborCount> {
    let report = state.services.reports.items_weekly().await?;
    Ok(Json(ApiResponse::success(report)))
}

#[utoipa::path(
    get,
    path = "/api/reports/items-by-season",
    responses(
        (status = 200, description = "Units by month and season", body = ApiResponse<SeasonReport>)
    ),
    tag = "reports"
)]
pub async fn items_by_season(State(state): State<AppState>) -> ApiResult<SeasonReport> {
    let report = state.services.reports.items_by_season().await?;
    Ok(Json(ApiResponse::success(report)))
}

#[utoipa::path(
    get,
    path = "/api/reports/gender-distribution",
    responses(
        (status = 200, description = "Neighbor count per gender", body = ApiResponse<GenderReport>)
    ),
    tag = "reports"
)]
pub async fn gender_distribution(State(state): State<AppState>) -> ApiResult<GenderReport> {
    let report = state.services.reports.gender_distribution().await?;
    Ok(Json(ApiResponse::success(report)))
}

#[utoipa::path(
    get,
    path = "/api/reports/age-distribution",
    responses(
        (status = 200, description = "Neighbor count per age band", body = ApiResponse<AgeReport>)
    ),
    tag = "reports"
)]
pub async fn age_distribution(State(state): State<AppState>) -> ApiResult<AgeReport> {
    let report = state.services.reports.age_distribution().await?;
    Ok(Json(ApiResponse::success(report)))
}

/// Next month's predicted demand per item
#[utoipa::path(
    get,
    path = "/api/reports/forecast",
    responses(
        (status = 200, description = "Predictions, largest first", body = ApiResponse<ForecastReport>),
        (status = 502, description = "Forecast process failed", body = crate::errors::ErrorResponse)
    ),
    tag = "reports"
)]
pub async fn forecast(State(state): State<AppState>) -> ApiResult<ForecastReport> {
    let report = state.services.reports.forecast().await?;
    Ok(Json(ApiResponse::success(report)))
}
