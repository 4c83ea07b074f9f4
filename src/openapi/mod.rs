use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pantry API",
        version = "0.1.0",
        description = r#"
# Food Pantry API

Inventory, neighbor registry, distribution ledger and reporting for a community food pantry.

## Features

- **Inventory**: items with stock levels, restock tracking and a manual edit audit log
- **Neighbors**: client registry with demographic filters and purchase history
- **Distributions**: sales decrement stock atomically and link the purchase to the neighbor
- **Reports**: weekly activity, popular items, low stock, seasonal totals, demographics and demand forecasts

## Errors

Failures use a single body shape:

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient stock for Rice: requested 5, available 2",
  "request_id": "9f0c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

Bulk endpoints answer `207 Multi-Status` with a per-entry report when some entries fail.
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "items", description = "Inventory items"),
        (name = "neighbors", description = "Neighbor registry"),
        (name = "purchases", description = "Distribution ledger"),
        (name = "edit-logs", description = "Manual inventory edit audit trail"),
        (name = "dashboard", description = "Date-window dashboard widgets"),
        (name = "reports", description = "Demographic, seasonal and forecast reports"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        // Items
        crate::handlers::items::list_items,
        crate::handlers::items::list_available_items,
        crate::handlers::items::get_item,
        crate::handlers::items::create_item,
        crate::handlers::items::update_item,
        crate::handlers::items::update_item_category,
        crate::handlers::items::delete_item,
        crate::handlers::items::delete_all_items,
        crate::handlers::items::delete_items_batch,
        crate::handlers::items::place_order,
        crate::handlers::items::save_item_edits,

        // Neighbors
        crate::handlers::neighbors::list_neighbors,
        crate::handlers::neighbors::get_neighbor,
        crate::handlers::neighbors::get_neighbor_history,
        crate::handlers::neighbors::create_neighbor,
        crate::handlers::neighbors::delete_neighbor,
        crate::handlers::neighbors::import_legacy_neighbors,

        // Purchases
        crate::handlers::purchases::list_purchases,
        crate::handlers::purchases::record_sale,
        crate::handlers::purchases::get_purchase,
        crate::handlers::purchases::list_purchases_for_item,
        crate::handlers::purchases::delete_purchase,

        // Edit logs
        crate::handlers::edit_logs::list_edit_logs,
        crate::handlers::edit_logs::create_edit_log,
        crate::handlers::edit_logs::get_edit_log,
        crate::handlers::edit_logs::delete_edit_log,

        // Dashboard and reports
        crate::handlers::reports::weekly_neighbors,
        crate::handlers::reports::popular_items,
        crate::handlers::reports::low_stock_items,
        crate::handlers::reports::weekly_visits,
        crate::handlers::reports::total_units_taken,
        crate::handlers::reports::items_weekly,
        crate::handlers::reports::items_by_season,
        crate::handlers::reports::gender_distribution,
        crate::handlers::reports::age_distribution,
        crate::handlers::reports::forecast,

        // Health
        crate::handlers::health::health_check,
        crate::handlers::health::api_status,
    ),
    components(
        schemas(crate::errors::ErrorResponse)
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_pantry_routes() {
        let openapi = ApiDoc::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Pantry API"));
        assert!(json.contains("/api/purchase"));
        assert!(json.contains("/api/dashboard/weekly-visits"));
        assert!(json.contains("/api/neighbors/import-legacy"));
    }
}
