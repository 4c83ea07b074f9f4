//! Recording a distribution: the one place where stock, ledger and neighbor
//! history are written together.

use crate::{
    db::DbPool,
    entities::{item::Entity as Item, purchase, purchase_line_item},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        items::{decrement_stock, insufficient_stock},
        neighbors::{append_history, resolve_neighbor, NeighborIdentity},
        parse_id,
        purchases::PurchaseRecord,
    },
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionTrait};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Body of `POST /purchase`. Fields are loosely typed so that every problem
/// surfaces as a `ValidationError` in a fixed order.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RecordSaleRequest {
    pub item_id: Option<String>,
    #[schema(value_type = Option<i64>)]
    pub quantity: Option<Value>,
    pub neighbor_id: Option<String>,
    pub name: Option<String>,
    /// Date of birth, `YYYY-MM-DD` or an RFC 3339 timestamp
    pub dob: Option<String>,
    #[schema(value_type = Option<i32>)]
    pub age: Option<Value>,
    pub gender: Option<String>,
    pub zipcode: Option<String>,
}

/// A sale request that passed field validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSale {
    pub item_id: Uuid,
    pub quantity: i32,
    pub neighbor: NeighborIdentity,
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

pub(crate) fn parse_dob(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).date_naive())
    })
}

/// Field checks, in order: item and quantity, then neighbor identity.
pub fn validate_sale_request(request: &RecordSaleRequest) -> Result<ValidSale, ServiceError> {
    let raw_item = non_blank(&request.item_id)
        .ok_or_else(|| ServiceError::ValidationError("item_id is required".into()))?;
    let raw_quantity = request
        .quantity
        .as_ref()
        .filter(|v| !v.is_null())
        .ok_or_else(|| ServiceError::ValidationError("quantity is required".into()))?;
    let item_id = parse_id("item_id", raw_item)?;
    let quantity = as_integer(raw_quantity)
        .filter(|q| *q > 0)
        .and_then(|q| i32::try_from(q).ok())
        .ok_or_else(|| {
            ServiceError::ValidationError("quantity must be a positive integer".into())
        })?;

    if let Some(raw_neighbor) = non_blank(&request.neighbor_id) {
        let neighbor_id = parse_id("neighbor_id", raw_neighbor)?;
        return Ok(ValidSale {
            item_id,
            quantity,
            neighbor: NeighborIdentity::Existing(neighbor_id),
        });
    }

    let mut missing = Vec::new();
    let name = non_blank(&request.name);
    let dob = non_blank(&request.dob);
    let age = request.age.as_ref().filter(|v| !v.is_null());
    let gender = non_blank(&request.gender);
    let zipcode = non_blank(&request.zipcode);
    for (field, present) in [
        ("name", name.is_some()),
        ("dob", dob.is_some()),
        ("age", age.is_some()),
        ("gender", gender.is_some()),
        ("zipcode", zipcode.is_some()),
    ] {
        if !present {
            missing.push(field);
        }
    }
    if !missing.is_empty() {
        return Err(ServiceError::ValidationError(format!(
            "neighbor_id or full neighbor details required; missing: {}",
            missing.join(", ")
        )));
    }

    let dob = dob.and_then(parse_dob).ok_or_else(|| {
        ServiceError::ValidationError("dob must be a date (YYYY-MM-DD)".into())
    })?;
    let age = age
        .and_then(as_integer)
        .filter(|a| (0..=150).contains(a))
        .and_then(|a| i32::try_from(a).ok())
        .ok_or_else(|| ServiceError::ValidationError("age must be between 0 and 150".into()))?;

    Ok(ValidSale {
        item_id,
        quantity,
        neighbor: NeighborIdentity::Demographics {
            name: name.unwrap_or_default().to_string(),
            dob,
            age,
            gender: gender.unwrap_or_default().to_string(),
            zipcode: zipcode.unwrap_or_default().to_string(),
        },
    })
}

/// Service executing distribution events
#[derive(Clone)]
pub struct SaleService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl SaleService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Records one sale. Stock decrement, purchase, line item and the
    /// neighbor's history link commit together or not at all.
    #[instrument(skip(self, request))]
    pub async fn record_sale(
        &self,
        request: RecordSaleRequest,
    ) -> Result<PurchaseRecord, ServiceError> {
        let result = self.execute(request).await;
        if let Err(e) = &result {
            crate::metrics::SALES_REJECTED
                .with_label_values(&[e.kind()])
                .inc();
            warn!(error = %e, "sale rejected");
        }
        result
    }

    async fn execute(&self, request: RecordSaleRequest) -> Result<PurchaseRecord, ServiceError> {
        let sale = validate_sale_request(&request)?;

        let txn = self.db.begin().await?;

        let item = Item::find_by_id(sale.item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Item", sale.item_id))?;
        if item.current_quantity < sale.quantity {
            return Err(insufficient_stock(&item, i64::from(sale.quantity)));
        }

        let (neighbor, neighbor_created) = resolve_neighbor(&txn, &sale.neighbor).await?;

        let after = decrement_stock(&txn, sale.item_id, sale.quantity).await?;
        let start_quantity = after.current_quantity + sale.quantity;

        let now = Utc::now();
        let purchase = purchase::ActiveModel {
            id: Set(Uuid::new_v4()),
            neighbor_id: Set(neighbor.id),
            purchase_date: Set(now),
        }
        .insert(&txn)
        .await?;

        let line = purchase_line_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            purchase_id: Set(purchase.id),
            item_id: Set(sale.item_id),
            quantity: Set(sale.quantity),
            start_quantity: Set(start_quantity),
            position: Set(0),
        }
        .insert(&txn)
        .await?;

        append_history(&txn, neighbor.id, purchase.id).await?;

        txn.commit().await?;

        crate::metrics::SALES_RECORDED.inc();
        crate::metrics::UNITS_DISTRIBUTED.inc_by(sale.quantity as u64);
        info!(
            purchase_id = %purchase.id,
            item_id = %sale.item_id,
            neighbor_id = %neighbor.id,
            quantity = sale.quantity,
            start_quantity,
            remaining = after.current_quantity,
            "sale recorded"
        );

        if neighbor_created {
            self.event_sender
                .send_or_log(Event::NeighborRegistered(neighbor.id));
        }
        self.event_sender.send_or_log(Event::StockDecremented {
            item_id: sale.item_id,
            quantity: sale.quantity,
            remaining: after.current_quantity,
        });
        self.event_sender.send_or_log(Event::PurchaseRecorded {
            purchase_id: purchase.id,
            neighbor_id: neighbor.id,
            item_id: sale.item_id,
            quantity: sale.quantity,
            recorded_at: now,
        });

        Ok(PurchaseRecord::from_parts(purchase, vec![line]))
    }
}
