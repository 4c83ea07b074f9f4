mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn saving_edits_updates_items_and_writes_one_log() {
    let app = TestApp::new().await;
    let rice = app.create_item("Rice", "Grains", 10).await;
    let beans = app.create_item("Beans", "Canned", 4).await;

    let (status, body) = app
        .post(
            "/api/item/edits",
            json!({
                "editor": "volunteer@pantry.org",
                "restock": true,
                "items": [
                    { "id": rice, "current_quantity": 25 },
                    { "id": beans, "name": "Black Beans", "current_quantity": 12 },
                ],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "save failed: {body}");
    assert_eq!(body["data"]["succeeded"], json!(2));
    assert_eq!(body["data"]["failed"], json!(0));
    let log_id = body["data"]["edit_log_id"].as_str().unwrap().to_string();

    let (_, item) = app.get(&format!("/api/item/{beans}")).await;
    assert_eq!(item["data"]["name"], json!("Black Beans"));
    assert_eq!(item["data"]["current_quantity"], json!(12));
    assert_eq!(item["data"]["last_restock_quantity"], json!(12));
    assert!(item["data"]["last_restock_date"].is_string());

    let (status, log) = app.get(&format!("/api/editLog/{log_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let log = &log["data"];
    assert_eq!(log["editor"], json!("volunteer@pantry.org"));
    assert_eq!(log["restock"], json!(true));
    assert_eq!(log["changes"].as_array().unwrap().len(), 2);
    assert_eq!(log["changes"][0]["prev_item"], json!({ "name": "Rice", "current_quantity": 10 }));
    assert_eq!(log["changes"][0]["new_item"], json!({ "name": "Rice", "current_quantity": 25 }));
    assert_eq!(log["changes"][1]["prev_item"]["name"], json!("Beans"));
    assert_eq!(log["changes"][1]["new_item"]["name"], json!("Black Beans"));

    let (_, logs) = app.get("/api/editLog").await;
    assert_eq!(logs["data"].as_array().unwrap().len(), 1);
}

// The client still shows 10 units after a sale took 2; the log records the
// quantity the store actually held.
#[tokio::test]
async fn before_image_comes_from_stored_item_not_client_copy() {
    let app = TestApp::new().await;
    let rice = app.create_item("Rice", "Grains", 10).await;
    let (status, _) = app.sell_to_new_neighbor(&rice, 2, "female", 34).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .post(
            "/api/item/edits",
            json!({
                "editor": "volunteer",
                "items": [{ "id": rice, "name": "Rice", "current_quantity": 7 }],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(app.item_quantity(&rice).await, 7);

    let log_id = body["data"]["edit_log_id"].as_str().unwrap();
    let (_, log) = app.get(&format!("/api/editLog/{log_id}")).await;
    let changes = log["data"]["changes"].as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["prev_item"], json!({ "name": "Rice", "current_quantity": 8 }));
    assert_eq!(changes[0]["new_item"], json!({ "name": "Rice", "current_quantity": 7 }));
}

#[tokio::test]
async fn partial_failure_reports_multi_status() {
    let app = TestApp::new().await;
    let rice = app.create_item("Rice", "Grains", 10).await;
    let missing = uuid::Uuid::new_v4().to_string();

    let (status, body) = app
        .post(
            "/api/item/edits",
            json!({
                "editor": "sam",
                "items": [
                    { "id": missing, "current_quantity": 3 },
                    { "id": rice, "current_quantity": 8 },
                    { "id": rice, "current_quantity": -1 },
                ],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::MULTI_STATUS, "{body}");
    let data = &body["data"];
    assert_eq!(data["succeeded"], json!(1));
    assert_eq!(data["failed"], json!(2));
    assert_eq!(data["outcomes"][0]["ok"], json!(false));
    assert_eq!(data["outcomes"][0]["error_kind"], json!("not_found"));
    assert_eq!(data["outcomes"][1]["ok"], json!(true));
    assert_eq!(data["outcomes"][2]["error_kind"], json!("validation_error"));

    assert_eq!(app.item_quantity(&rice).await, 8);
    let (_, item) = app.get(&format!("/api/item/{rice}")).await;
    assert_eq!(
        item["data"]["last_restock_quantity"],
        json!(10),
        "a plain edit does not move the restock mark"
    );

    let log_id = data["edit_log_id"].as_str().unwrap();
    let (_, log) = app.get(&format!("/api/editLog/{log_id}")).await;
    assert_eq!(log["data"]["changes"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn editor_is_required() {
    let app = TestApp::new().await;
    let rice = app.create_item("Rice", "Grains", 10).await;

    let (status, _) = app
        .post(
            "/api/item/edits",
            json!({ "editor": "  ", "items": [{ "id": rice, "current_quantity": 1 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/editLog",
            json!({ "item_id": rice, "editor": "", "new_item": { "name": "Rice", "current_quantity": 1 } }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/editLog",
            json!({ "item_id": rice, "editor": "   ", "new_item": { "name": "Rice", "current_quantity": 1 } }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, logs) = app.get("/api/editLog").await;
    assert!(logs["data"].as_array().unwrap().is_empty());
    assert_eq!(app.item_quantity(&rice).await, 10);
}

#[tokio::test]
async fn direct_log_entry_leaves_item_alone() {
    let app = TestApp::new().await;
    let rice = app.create_item("Rice", "Grains", 10).await;

    let (status, body) = app
        .post(
            "/api/editLog",
            json!({
                "item_id": rice,
                "editor": "auditor",
                "new_item": { "name": "Brown Rice", "current_quantity": 4 },
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["changes"][0]["prev_item"]["current_quantity"], json!(10));
    assert_eq!(body["data"]["changes"][0]["new_item"]["name"], json!("Brown Rice"));
    assert_eq!(app.item_quantity(&rice).await, 10);

    let log_id = body["data"]["id"].as_str().unwrap().to_string();
    let (status, _) = app
        .request(Method::DELETE, &format!("/api/editLog/{log_id}"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&format!("/api/editLog/{log_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
