#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use pantry_api::{
    config::AppConfig,
    db::{self, DbConfig},
    events::{self, EventSender},
    services::forecasting::TrendForecaster,
    AppState,
};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Helper harness for spinning up the full router over an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // every pooled connection to sqlite::memory: is its own database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_with_config(&DbConfig::from(&cfg))
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::with_forecaster(
            Arc::new(pool),
            cfg,
            event_sender,
            Arc::new(TrendForecaster),
        );
        let router = pantry_api::build_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("request should build");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    /// Creates an item and returns its id.
    pub async fn create_item(&self, name: &str, category: &str, quantity: i32) -> String {
        let (status, body) = self
            .post(
                "/api/item",
                json!({
                    "name": name,
                    "category": category,
                    "unit": "can",
                    "current_quantity": quantity,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create item failed: {body}");
        body["data"]["id"]
            .as_str()
            .expect("created item should carry an id")
            .to_string()
    }

    /// Records a sale for a freshly named neighbor described by demographics.
    pub async fn sell_to_new_neighbor(
        &self,
        item_id: &str,
        quantity: i64,
        gender: &str,
        age: i32,
    ) -> (StatusCode, Value) {
        self.post(
            "/api/purchase",
            json!({
                "item_id": item_id,
                "quantity": quantity,
                "name": format!("Neighbor {}", uuid::Uuid::new_v4()),
                "dob": "1990-04-12",
                "age": age,
                "gender": gender,
                "zipcode": "94110",
            }),
        )
        .await
    }

    pub async fn item_quantity(&self, item_id: &str) -> i64 {
        let (status, body) = self.get(&format!("/api/item/{item_id}")).await;
        assert_eq!(status, StatusCode::OK, "get item failed: {body}");
        body["data"]["current_quantity"]
            .as_i64()
            .expect("item should report a quantity")
    }
}
