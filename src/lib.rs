//! Pantry API Library
//!
//! Inventory, neighbor registry, distribution ledger and reporting for a food pantry.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{http::HeaderValue, response::Json, routing::get, Router};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use utoipa::ToSchema;

use crate::services::{
    edit_logs::EditLogService,
    forecasting::{forecaster_from_config, Forecaster},
    items::ItemService,
    neighbors::NeighborService,
    purchases::PurchaseService,
    reports::{ReportService, ReportSettings},
    sales::SaleService,
    AppServices,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: AppServices,
}

impl AppState {
    /// Wires every service against one pool, using the forecaster named by the config.
    pub fn new(
        db: Arc<db::DbPool>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let forecaster = forecaster_from_config(&config);
        Self::with_forecaster(db, config, event_sender, forecaster)
    }

    pub fn with_forecaster(
        db: Arc<db::DbPool>,
        config: config::AppConfig,
        event_sender: events::EventSender,
        forecaster: Arc<dyn Forecaster>,
    ) -> Self {
        let services = build_services(db.clone(), &config, event_sender.clone(), forecaster);
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

pub fn build_services(
    db: Arc<db::DbPool>,
    config: &config::AppConfig,
    event_sender: events::EventSender,
    forecaster: Arc<dyn Forecaster>,
) -> AppServices {
    AppServices {
        items: Arc::new(ItemService::new(db.clone(), event_sender.clone())),
        neighbors: Arc::new(NeighborService::new(db.clone(), event_sender.clone())),
        purchases: Arc::new(PurchaseService::new(db.clone(), event_sender.clone())),
        sales: Arc::new(SaleService::new(db.clone(), event_sender.clone())),
        edit_logs: Arc::new(EditLogService::new(db.clone(), event_sender)),
        reports: Arc::new(ReportService::new(
            db,
            forecaster,
            ReportSettings::from(config),
        )),
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        assert!(response.success);
        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn success_response_outside_request_has_no_request_id() {
        let response = ApiResponse::success(1);
        let meta = response.meta.expect("metadata expected");
        assert!(meta.request_id.is_none());
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Every pantry route, mounted under `/api` by [`build_router`].
pub fn api_routes() -> Router<AppState> {
    let neighbors = handlers::neighbors::neighbors_routes();
    Router::new()
        .nest("/item", handlers::items::items_routes())
        .nest("/neighbor", neighbors.clone())
        .nest("/neighbors", neighbors)
        .nest("/purchase", handlers::purchases::purchases_routes())
        .nest("/editLog", handlers::edit_logs::edit_logs_routes())
        .nest("/dashboard", handlers::reports::dashboard_routes())
        .nest("/reports", handlers::reports::reports_routes())
}

fn cors_layer(config: &config::AppConfig) -> CorsLayer {
    let origin = config
        .cors_allowed_origin
        .as_deref()
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .and_then(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                ::tracing::warn!(origin = o, "ignoring unparseable CORS origin");
                None
            }
        });

    match origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        None if config.is_development() => CorsLayer::permissive(),
        // no cross-origin callers outside development unless configured
        None => CorsLayer::new(),
    }
}

/// Full application router: API, health, metrics and Swagger UI behind the
/// request-id, tracing, CORS, timeout and compression layers.
pub fn build_router(state: AppState) -> Router {
    let request_timeout = state.config.request_timeout();
    let cors = cors_layer(&state.config);

    Router::<AppState>::new()
        .route("/", get(|| async { "pantry-api up" }))
        .route("/health", get(handlers::health::health_check))
        .route("/status", get(handlers::health::api_status))
        .route("/metrics", get(metrics::metrics_handler))
        .nest("/api", api_routes())
        .merge(openapi::swagger_ui())
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors)
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
