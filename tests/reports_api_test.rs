mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::TestApp;
use pantry_api::entities::purchase;
use sea_orm::{sea_query::Expr, EntityTrait};
use serde_json::{json, Value};

fn band(age_data: &Value, label: &str) -> u64 {
    age_data
        .as_array()
        .unwrap()
        .iter()
        .find(|entry| entry["age_group"] == label)
        .and_then(|entry| entry["value"].as_u64())
        .unwrap_or_else(|| panic!("missing age band {label}"))
}

#[tokio::test]
async fn dashboard_reports_cover_todays_sales() {
    let app = TestApp::new().await;
    let rice = app.create_item("Rice", "Grains", 20).await;
    let beans = app.create_item("Beans", "Canned", 20).await;

    app.sell_to_new_neighbor(&rice, 2, "female", 34).await;
    app.sell_to_new_neighbor(&beans, 5, "male", 70).await;
    app.sell_to_new_neighbor(&rice, 4, "female", 50).await;

    let (status, body) = app.get("/api/dashboard/weekly-neighbors").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["number"], json!(3));

    let (_, body) = app.get("/api/dashboard/total-units-taken").await;
    assert_eq!(body["data"]["total_units"], json!(11));

    let (_, body) = app.get("/api/dashboard/popular-items").await;
    let popular = &body["data"];
    assert_eq!(popular["item_id"], json!(rice));
    assert_eq!(popular["name"], json!("Rice"));
    assert_eq!(popular["total"], json!(6));
    let today = Utc::now().date_naive().to_string();
    let points = popular["data"].as_array().unwrap();
    assert_eq!(points.len(), 8, "default window spans eight calendar days");
    assert_eq!(points.last().unwrap()["name"], json!(today));

    let (_, body) = app.get("/api/dashboard/weekly-visits").await;
    let visits = body["data"]["visits"].as_array().unwrap();
    assert_eq!(visits.last().unwrap()["date"], json!(today));
    assert_eq!(visits.last().unwrap()["count"], json!(3));
    assert!(visits[..visits.len() - 1].iter().all(|v| v["count"] == 0));

    let (_, body) = app.get("/api/reports/items-weekly").await;
    assert_eq!(body["data"]["number"], json!(3));
}

#[tokio::test]
async fn popular_items_breaks_ties_by_name() {
    let app = TestApp::new().await;
    let rice = app.create_item("Rice", "Grains", 20).await;
    let beans = app.create_item("Beans", "Canned", 20).await;
    app.sell_to_new_neighbor(&rice, 4, "male", 20).await;
    app.sell_to_new_neighbor(&beans, 1, "male", 20).await;
    app.sell_to_new_neighbor(&beans, 3, "male", 20).await;

    let (_, body) = app.get("/api/dashboard/popular-items").await;
    assert_eq!(body["data"]["item_id"], json!(beans));
    assert_eq!(body["data"]["name"], json!("Beans"));
    assert_eq!(body["data"]["total"], json!(4));
}

#[tokio::test]
async fn empty_window_reports_zeroes() {
    let app = TestApp::new().await;
    let rice = app.create_item("Rice", "Grains", 20).await;
    app.sell_to_new_neighbor(&rice, 2, "female", 34).await;

    let query = "startDate=2020-01-01&endDate=2020-01-03";
    let (status, body) = app.get(&format!("/api/dashboard/popular-items?{query}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!({ "item_id": null, "name": null, "total": 0, "data": [] })
    );

    let (_, body) = app
        .get(&format!("/api/dashboard/weekly-visits?{query}"))
        .await;
    assert_eq!(body["data"]["start_date"], json!("2020-01-01"));
    assert_eq!(body["data"]["end_date"], json!("2020-01-03"));
    assert_eq!(
        body["data"]["visits"],
        json!([
            { "date": "2020-01-01", "count": 0 },
            { "date": "2020-01-02", "count": 0 },
            { "date": "2020-01-03", "count": 0 },
        ])
    );

    let (_, body) = app
        .get("/api/dashboard/total-units-taken?start_date=2020-01-01&end_date=2020-01-03")
        .await;
    assert_eq!(body["data"]["total_units"], json!(0));
}

#[tokio::test]
async fn bad_windows_are_rejected() {
    let app = TestApp::new().await;

    let (status, _) = app
        .get("/api/dashboard/weekly-neighbors?startDate=yesterday")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let end = Utc::now().date_naive();
    let start = end + Duration::days(2);
    let (status, body) = app
        .get(&format!(
            "/api/dashboard/weekly-visits?startDate={start}&endDate={end}"
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("start_date"));

    let (status, _) = app
        .get("/api/dashboard/weekly-visits?start_date=0001-01-01&end_date=9999-12-31")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn low_stock_lists_items_below_their_restock_level() {
    let app = TestApp::new().await;
    let rice = app.create_item("Rice", "Grains", 10).await;
    let beans = app.create_item("Beans", "Canned", 10).await;
    app.sell_to_new_neighbor(&rice, 3, "female", 34).await;

    let (status, body) = app.get("/api/dashboard/low-stock-items").await;
    assert_eq!(status, StatusCode::OK);
    let low = body["data"]["low_stock_items"].as_array().unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0]["id"], json!(rice));

    let (status, _) = app
        .request(
            Method::PATCH,
            &format!("/api/item/{beans}"),
            Some(json!({ "current_quantity": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.get("/api/dashboard/low-stock-items").await;
    let names: Vec<&str> = body["data"]["low_stock_items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Beans", "Rice"]);
}

#[tokio::test]
async fn demographic_reports_count_every_neighbor() {
    let app = TestApp::new().await;
    let rice = app.create_item("Rice", "Grains", 20).await;
    app.sell_to_new_neighbor(&rice, 1, "female", 34).await;
    app.sell_to_new_neighbor(&rice, 1, "female", 50).await;
    app.sell_to_new_neighbor(&rice, 1, "male", 70).await;

    let (_, body) = app.get("/api/reports/gender-distribution").await;
    assert_eq!(body["data"]["gender_data"], json!({ "female": 2, "male": 1 }));

    let (_, body) = app.get("/api/reports/age-distribution").await;
    let age_data = &body["data"]["age_data"];
    assert_eq!(age_data.as_array().unwrap().len(), 9);
    assert_eq!(band(age_data, "30-35"), 1);
    assert_eq!(band(age_data, "50-59"), 1);
    assert_eq!(band(age_data, "65+"), 1);
    assert_eq!(band(age_data, "0-5"), 0);
}

#[tokio::test]
async fn season_report_sums_to_units_taken() {
    let app = TestApp::new().await;
    let rice = app.create_item("Rice", "Grains", 20).await;
    app.sell_to_new_neighbor(&rice, 3, "female", 34).await;
    app.sell_to_new_neighbor(&rice, 4, "male", 40).await;

    let (status, body) = app.get("/api/reports/items-by-season").await;
    assert_eq!(status, StatusCode::OK);
    let seasons = body["data"]["season_data"].as_object().unwrap();
    assert_eq!(seasons.len(), 4);
    let total: i64 = seasons.values().map(|v| v.as_i64().unwrap()).sum();
    assert_eq!(total, 7);

    let month = Utc::now().format("%-m").to_string();
    assert_eq!(body["data"]["monthly"][month.as_str()], json!(7));
}

#[tokio::test]
async fn forecast_needs_two_months_of_history() {
    let app = TestApp::new().await;
    let rice = app.create_item("Rice", "Grains", 50).await;
    app.create_item("Beans", "Canned", 50).await;
    app.sell_to_new_neighbor(&rice, 6, "female", 34).await;

    let (status, body) = app.get("/api/reports/forecast").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["predictions"], json!([]));

    // move the first sale into an earlier month, then sell again today
    purchase::Entity::update_many()
        .col_expr(
            purchase::Column::PurchaseDate,
            Expr::value(Utc::now() - Duration::days(40)),
        )
        .exec(&*app.state.db)
        .await
        .expect("backdate purchase");
    app.sell_to_new_neighbor(&rice, 4, "male", 52).await;

    let (status, body) = app.get("/api/reports/forecast").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["success"], json!(true));
    let predictions = body["data"]["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 1, "items never taken are not forecast");
    assert_eq!(predictions[0]["item_code"], json!(rice));
    assert!(predictions[0]["predicted_qty"].as_i64().unwrap() >= 0);
}

#[tokio::test]
async fn health_and_docs_are_served() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app.get("/api-docs/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/purchase"].is_object());

    pantry_api::metrics::init_metrics();
    let (status, body) = app.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains("pantry_sales_recorded_total"));
}
