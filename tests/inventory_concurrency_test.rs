mod common;

use assert_matches::assert_matches;
use common::TestApp;
use pantry_api::{errors::ServiceError, services::sales::RecordSaleRequest};
use serde_json::json;

// Twenty sales of one unit race for ten units of stock: exactly ten win and
// the losers are refused for lack of stock rather than driving it negative.
#[tokio::test]
async fn concurrent_sales_never_oversell() {
    let app = TestApp::new().await;
    let item_id = app.create_item("Peanut Butter", "Protein", 10).await;

    let (_, neighbor) = app
        .post(
            "/api/neighbors",
            json!({
                "name": "Sam",
                "dob": "1970-06-15",
                "age": 54,
                "gender": "male",
                "zipcode": "30301",
            }),
        )
        .await;
    let neighbor_id = neighbor["data"]["id"].as_str().unwrap().to_string();

    let mut tasks = vec![];
    for _ in 0..20 {
        let sales = app.state.services.sales.clone();
        let request = RecordSaleRequest {
            item_id: Some(item_id.clone()),
            quantity: Some(json!(1)),
            neighbor_id: Some(neighbor_id.clone()),
            ..Default::default()
        };
        tasks.push(tokio::spawn(async move { sales.record_sale(request).await }));
    }

    let mut success = 0;
    for task in tasks {
        match task.await.expect("sale task panicked") {
            Ok(_) => success += 1,
            Err(e) => assert_matches!(e, ServiceError::InsufficientStock(_)),
        }
    }
    assert_eq!(success, 10, "exactly 10 sales should succeed; got {}", success);
    assert_eq!(app.item_quantity(&item_id).await, 0);

    let (_, history) = app
        .get(&format!("/api/neighbors/{neighbor_id}/history"))
        .await;
    assert_eq!(history["data"]["history"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn order_and_sales_share_the_stock_guard() {
    let app = TestApp::new().await;
    let item_id = app.create_item("Rice", "Grains", 6).await;

    let (status, body) = app
        .request(
            axum::http::Method::PUT,
            "/api/item/order",
            Some(json!({ "order_list": [
                { "id": item_id, "order_quantity": 2 },
                { "id": item_id, "order_quantity": 3 },
            ]})),
        )
        .await;
    assert_eq!(status, axum::http::StatusCode::OK, "order failed: {body}");
    assert_eq!(body["data"]["updated_items"][0]["new_quantity"], json!(1));

    let (status, _) = app.sell_to_new_neighbor(&item_id, 2, "female", 41).await;
    assert_eq!(status, axum::http::StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app
        .request(
            axum::http::Method::PUT,
            "/api/item/order",
            Some(json!({ "order_list": [{ "id": item_id, "order_quantity": 2 }] })),
        )
        .await;
    assert_eq!(status, axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.item_quantity(&item_id).await, 1);
}

#[tokio::test]
async fn oversized_order_totals_are_rejected_without_touching_stock() {
    let app = TestApp::new().await;
    let item_id = app.create_item("Rice", "Grains", 10).await;

    let (status, body) = app
        .request(
            axum::http::Method::PUT,
            "/api/item/order",
            Some(json!({ "order_list": [
                { "id": item_id, "order_quantity": i64::MAX },
                { "id": item_id, "order_quantity": i64::MAX },
            ]})),
        )
        .await;
    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(app.item_quantity(&item_id).await, 10);
}
