use crate::{
    db::DbPool,
    entities::{
        item::{self, Entity as Item},
        purchase::{self, Entity as Purchase},
        purchase_line_item::{self, Entity as PurchaseLineItem},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{parse_id, BatchReport},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Placeholder written when an item is created without an item number or unit.
pub const PLACEHOLDER_CODE: &str = "ph";

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateItemRequest {
    pub item_no: Option<String>,
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    pub unit: Option<String>,
    #[validate(range(min = 0.0, message = "gross_unit_weight cannot be negative"))]
    pub gross_unit_weight: Option<f64>,
    #[validate(length(min = 1, message = "category is required"))]
    pub category: String,
    #[validate(range(min = 0, message = "current_quantity cannot be negative"))]
    pub current_quantity: i32,
    #[validate(range(min = 0, message = "last_restock_quantity cannot be negative"))]
    pub last_restock_quantity: Option<i32>,
    pub last_restock_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateItemRequest {
    #[validate(length(min = 1, message = "name cannot be empty"))]
    pub name: Option<String>,
    #[validate(range(min = 0, message = "last_restock_quantity cannot be negative"))]
    pub last_restock_quantity: Option<i32>,
    #[validate(range(min = 0, message = "current_quantity cannot be negative"))]
    pub current_quantity: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateCategoryRequest {
    #[validate(length(min = 1, message = "category is required"))]
    pub category: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OrderLine {
    pub id: String,
    pub order_quantity: i64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OrderRequest {
    pub order_list: Vec<OrderLine>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UpdatedQuantity {
    pub id: Uuid,
    pub new_quantity: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderResult {
    pub updated_items: Vec<UpdatedQuantity>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AvailableItem {
    pub id: Uuid,
    pub name: String,
}

/// An item together with the purchases that took stock from it, oldest first.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ItemDetail {
    #[serde(flatten)]
    pub item: item::Model,
    pub history: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeleteAllResult {
    pub deleted_count: u64,
}

/// Takes `quantity` units out of stock in a single conditional statement.
///
/// Returns the item as it stands after the decrement. When the row does not
/// hold enough stock nothing is written and `InsufficientStock` is returned.
pub(crate) async fn decrement_stock<C>(
    conn: &C,
    item_id: Uuid,
    quantity: i32,
) -> Result<item::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let result = Item::update_many()
        .col_expr(
            item::Column::CurrentQuantity,
            Expr::col(item::Column::CurrentQuantity).sub(quantity),
        )
        .col_expr(item::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(item::Column::Id.eq(item_id))
        .filter(item::Column::CurrentQuantity.gte(quantity))
        .exec(conn)
        .await?;

    let current = Item::find_by_id(item_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Item", item_id))?;

    if result.rows_affected == 0 {
        return Err(insufficient_stock(&current, i64::from(quantity)));
    }
    Ok(current)
}

pub(crate) fn insufficient_stock(item: &item::Model, requested: i64) -> ServiceError {
    ServiceError::InsufficientStock(format!(
        "item {} ({}) has {} on hand, requested {}",
        item.id, item.name, item.current_quantity, requested
    ))
}

/// Sums duplicate lines per item, keeping first-seen order. A merged line
/// must fit the stock column.
fn merge_order_lines(lines: &[OrderLine]) -> Result<Vec<(Uuid, i32)>, ServiceError> {
    let mut merged: Vec<(Uuid, i64)> = Vec::with_capacity(lines.len());
    for line in lines {
        let id = parse_id("id", &line.id)?;
        if line.order_quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "order_quantity for item {} must be a positive integer",
                id
            )));
        }
        match merged.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, total)) => {
                *total = total
                    .checked_add(line.order_quantity)
                    .ok_or_else(|| order_quantity_too_large(id))?;
            }
            None => merged.push((id, line.order_quantity)),
        }
    }
    merged
        .into_iter()
        .map(|(id, total)| {
            i32::try_from(total)
                .map(|quantity| (id, quantity))
                .map_err(|_| order_quantity_too_large(id))
        })
        .collect()
}

fn order_quantity_too_large(id: Uuid) -> ServiceError {
    ServiceError::ValidationError(format!(
        "order_quantity for item {} exceeds {}",
        id,
        i32::MAX
    ))
}

/// Service for the item store
#[derive(Clone)]
pub struct ItemService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl ItemService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<item::Model>, ServiceError> {
        Ok(Item::find()
            .order_by_asc(item::Column::Name)
            .all(&*self.db)
            .await?)
    }

    /// Items that still have stock on hand.
    #[instrument(skip(self))]
    pub async fn available(&self) -> Result<Vec<AvailableItem>, ServiceError> {
        let items = Item::find()
            .filter(item::Column::CurrentQuantity.gt(0))
            .order_by_asc(item::Column::Name)
            .all(&*self.db)
            .await?;
        Ok(items
            .into_iter()
            .map(|i| AvailableItem {
                id: i.id,
                name: i.name,
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<ItemDetail, ServiceError> {
        let item = self.find(id).await?;

        let lines = PurchaseLineItem::find()
            .filter(purchase_line_item::Column::ItemId.eq(id))
            .all(&*self.db)
            .await?;
        let purchase_ids: Vec<Uuid> = lines.iter().map(|l| l.purchase_id).collect();
        let mut history: Vec<(DateTime<Utc>, Uuid)> = if purchase_ids.is_empty() {
            Vec::new()
        } else {
            Purchase::find()
                .filter(purchase::Column::Id.is_in(purchase_ids))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|p| (p.purchase_date, p.id))
                .collect()
        };
        history.sort();

        Ok(ItemDetail {
            item,
            history: history.into_iter().map(|(_, id)| id).collect(),
        })
    }

    pub(crate) async fn find(&self, id: Uuid) -> Result<item::Model, ServiceError> {
        Item::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Item", id))
    }

    /// Creates an item, backfilling item number, unit, weight and restock metadata.
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create(&self, request: CreateItemRequest) -> Result<ItemDetail, ServiceError> {
        request.validate()?;

        let now = Utc::now();
        let non_empty = |v: Option<String>| {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| PLACEHOLDER_CODE.to_string())
        };

        let model = item::ActiveModel {
            id: Set(Uuid::new_v4()),
            item_no: Set(non_empty(request.item_no)),
            name: Set(request.name.trim().to_string()),
            unit: Set(non_empty(request.unit)),
            gross_unit_weight: Set(request.gross_unit_weight.unwrap_or(0.0)),
            category: Set(request.category.trim().to_string()),
            current_quantity: Set(request.current_quantity),
            last_restock_quantity: Set(Some(
                request
                    .last_restock_quantity
                    .unwrap_or(request.current_quantity),
            )),
            last_restock_date: Set(Some(request.last_restock_date.unwrap_or(now))),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(item_id = %model.id, quantity = model.current_quantity, "item created");
        self.event_sender.send_or_log(Event::ItemCreated(model.id));

        Ok(ItemDetail {
            item: model,
            history: Vec::new(),
        })
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateItemRequest,
    ) -> Result<item::Model, ServiceError> {
        request.validate()?;
        let existing = self.find(id).await?;

        let mut active: item::ActiveModel = existing.into();
        if let Some(name) = request.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ServiceError::ValidationError("name cannot be empty".into()));
            }
            active.name = Set(name);
        }
        if let Some(last) = request.last_restock_quantity {
            active.last_restock_quantity = Set(Some(last));
        }
        if let Some(current) = request.current_quantity {
            active.current_quantity = Set(current);
        }

        let updated = active.update(&*self.db).await?;
        info!(item_id = %id, "item updated");
        self.event_sender.send_or_log(Event::ItemUpdated(id));
        Ok(updated)
    }

    #[instrument(skip(self, request))]
    pub async fn update_category(
        &self,
        id: Uuid,
        request: UpdateCategoryRequest,
    ) -> Result<item::Model, ServiceError> {
        request.validate()?;
        let category = request.category.trim().to_string();
        if category.is_empty() {
            return Err(ServiceError::ValidationError("category is required".into()));
        }

        let mut active: item::ActiveModel = self.find(id).await?.into();
        active.category = Set(category);
        let updated = active.update(&*self.db).await?;

        info!(item_id = %id, category = %updated.category, "item category changed");
        self.event_sender.send_or_log(Event::ItemUpdated(id));
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = Item::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Item", id));
        }
        info!(item_id = %id, "item deleted");
        self.event_sender.send_or_log(Event::ItemDeleted(id));
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_all(&self) -> Result<DeleteAllResult, ServiceError> {
        let result = Item::delete_many().exec(&*self.db).await?;
        warn!(count = result.rows_affected, "all items deleted");
        self.event_sender.send_or_log(Event::ItemsCleared {
            count: result.rows_affected,
        });
        Ok(DeleteAllResult {
            deleted_count: result.rows_affected,
        })
    }

    /// Deletes each id independently and reports per-id outcomes.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn delete_batch(&self, ids: Vec<String>) -> Result<BatchReport, ServiceError> {
        let mut report = BatchReport::default();
        for raw in ids {
            let outcome = match parse_id("id", &raw) {
                Ok(id) => self.delete(id).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => report.record_success(raw),
                Err(e) => {
                    warn!(id = %raw, error = %e, "batch delete entry failed");
                    report.record_failure(raw, &e);
                }
            }
        }
        Ok(report)
    }

    /// Bulk decrement. Every line is checked before anything is written; the
    /// writes then happen in one transaction so either all apply or none do.
    #[instrument(skip(self, request), fields(lines = request.order_list.len()))]
    pub async fn place_order(&self, request: OrderRequest) -> Result<OrderResult, ServiceError> {
        if request.order_list.is_empty() {
            return Err(ServiceError::ValidationError(
                "order_list must contain at least one entry".into(),
            ));
        }
        let lines = merge_order_lines(&request.order_list)?;

        let txn = self.db.begin().await?;

        let ids: Vec<Uuid> = lines.iter().map(|(id, _)| *id).collect();
        let items: HashMap<Uuid, item::Model> = Item::find()
            .filter(item::Column::Id.is_in(ids))
            .all(&txn)
            .await?
            .into_iter()
            .map(|i| (i.id, i))
            .collect();

        let mut checked = Vec::with_capacity(lines.len());
        for (id, quantity) in &lines {
            let item = items
                .get(id)
                .ok_or_else(|| ServiceError::not_found("Item", id))?;
            if item.current_quantity < *quantity {
                return Err(insufficient_stock(item, i64::from(*quantity)));
            }
            checked.push((*id, *quantity));
        }

        let mut updated_items = Vec::with_capacity(checked.len());
        for (id, quantity) in checked {
            let after = decrement_stock(&txn, id, quantity).await?;
            updated_items.push(UpdatedQuantity {
                id,
                new_quantity: after.current_quantity,
            });
        }
        txn.commit().await?;

        let units: u64 = lines.iter().map(|(_, q)| u64::from(q.unsigned_abs())).sum();
        crate::metrics::UNITS_DISTRIBUTED.inc_by(units);
        for (line, updated) in lines.iter().zip(&updated_items) {
            self.event_sender.send_or_log(Event::StockDecremented {
                item_id: updated.id,
                quantity: line.1,
                remaining: updated.new_quantity,
            });
        }
        info!(items = updated_items.len(), units, "order applied");

        Ok(OrderResult { updated_items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &Uuid, quantity: i64) -> OrderLine {
        OrderLine {
            id: id.to_string(),
            order_quantity: quantity,
        }
    }

    #[test]
    fn merge_sums_duplicates_in_first_seen_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = merge_order_lines(&[line(&a, 2), line(&b, 1), line(&a, 3)]).unwrap();
        assert_eq!(merged, vec![(a, 5), (b, 1)]);
    }

    #[test]
    fn merge_rejects_non_positive_quantities() {
        let a = Uuid::new_v4();
        assert!(matches!(
            merge_order_lines(&[line(&a, 0)]),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            merge_order_lines(&[OrderLine {
                id: "nope".into(),
                order_quantity: 1
            }]),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn merge_rejects_totals_beyond_stock_range() {
        let a = Uuid::new_v4();
        assert!(matches!(
            merge_order_lines(&[line(&a, i64::MAX), line(&a, i64::MAX)]),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            merge_order_lines(&[line(&a, i64::from(i32::MAX)), line(&a, 1)]),
            Err(ServiceError::ValidationError(_))
        ));
        assert_eq!(
            merge_order_lines(&[line(&a, i64::from(i32::MAX))]).unwrap(),
            vec![(a, i32::MAX)]
        );
    }

    #[test]
    fn create_request_validation() {
        let request = CreateItemRequest {
            item_no: None,
            name: String::new(),
            unit: None,
            gross_unit_weight: None,
            category: "Canned".into(),
            current_quantity: -1,
            last_restock_quantity: None,
            last_restock_date: None,
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("name"));
        assert!(errors.field_errors().contains_key("current_quantity"));
    }
}
