use crate::{
    db::DbPool,
    entities::{
        neighbor_history::{self, Entity as NeighborHistory},
        purchase::{self, Entity as Purchase},
        purchase_line_item::{self, Entity as PurchaseLineItem},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

const ID_CHUNK: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LineItemView {
    pub item_id: Uuid,
    pub quantity: i32,
    pub start_quantity: i32,
}

/// A purchase with its line items.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PurchaseRecord {
    pub id: Uuid,
    pub neighbor_id: Uuid,
    pub purchase_date: DateTime<Utc>,
    pub items: Vec<LineItemView>,
}

impl PurchaseRecord {
    pub fn from_parts(
        purchase: purchase::Model,
        mut lines: Vec<purchase_line_item::Model>,
    ) -> Self {
        lines.sort_by_key(|l| l.position);
        Self {
            id: purchase.id,
            neighbor_id: purchase.neighbor_id,
            purchase_date: purchase.purchase_date,
            items: lines
                .into_iter()
                .map(|l| LineItemView {
                    item_id: l.item_id,
                    quantity: l.quantity,
                    start_quantity: l.start_quantity,
                })
                .collect(),
        }
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|l| i64::from(l.quantity)).sum()
    }
}

/// Loads line items for the given purchases and pairs them up, keeping the purchase order.
pub(crate) async fn attach_line_items<C>(
    conn: &C,
    purchases: Vec<purchase::Model>,
) -> Result<Vec<PurchaseRecord>, ServiceError>
where
    C: ConnectionTrait,
{
    let mut by_purchase: HashMap<Uuid, Vec<purchase_line_item::Model>> = HashMap::new();
    let ids: Vec<Uuid> = purchases.iter().map(|p| p.id).collect();
    for chunk in ids.chunks(ID_CHUNK) {
        let lines = PurchaseLineItem::find()
            .filter(purchase_line_item::Column::PurchaseId.is_in(chunk.to_vec()))
            .all(conn)
            .await?;
        for line in lines {
            by_purchase.entry(line.purchase_id).or_default().push(line);
        }
    }

    Ok(purchases
        .into_iter()
        .map(|p| {
            let lines = by_purchase.remove(&p.id).unwrap_or_default();
            PurchaseRecord::from_parts(p, lines)
        })
        .collect())
}

/// Read and administrative access to the purchase ledger
#[derive(Clone)]
pub struct PurchaseService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl PurchaseService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// All purchases, newest first.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<PurchaseRecord>, ServiceError> {
        let purchases = Purchase::find()
            .order_by_desc(purchase::Column::PurchaseDate)
            .all(&*self.db)
            .await?;
        attach_line_items(&*self.db, purchases).await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<PurchaseRecord, ServiceError> {
        let purchase = Purchase::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Purchase", id))?;
        let lines = PurchaseLineItem::find()
            .filter(purchase_line_item::Column::PurchaseId.eq(id))
            .all(&*self.db)
            .await?;
        Ok(PurchaseRecord::from_parts(purchase, lines))
    }

    /// Purchases that took stock from one item, newest first.
    #[instrument(skip(self))]
    pub async fn for_item(&self, item_id: Uuid) -> Result<Vec<PurchaseRecord>, ServiceError> {
        let purchase_ids: Vec<Uuid> = PurchaseLineItem::find()
            .filter(purchase_line_item::Column::ItemId.eq(item_id))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|l| l.purchase_id)
            .collect();

        let mut purchases = Vec::with_capacity(purchase_ids.len());
        for chunk in purchase_ids.chunks(ID_CHUNK) {
            purchases.extend(
                Purchase::find()
                    .filter(purchase::Column::Id.is_in(chunk.to_vec()))
                    .all(&*self.db)
                    .await?,
            );
        }
        purchases.sort_by(|a, b| {
            b.purchase_date
                .cmp(&a.purchase_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        purchases.dedup_by_key(|p| p.id);

        attach_line_items(&*self.db, purchases).await
    }

    /// Administrative delete. Stock is not restored.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        PurchaseLineItem::delete_many()
            .filter(purchase_line_item::Column::PurchaseId.eq(id))
            .exec(&txn)
            .await?;
        NeighborHistory::delete_many()
            .filter(neighbor_history::Column::PurchaseId.eq(id))
            .exec(&txn)
            .await?;
        let result = Purchase::delete_by_id(id).exec(&txn).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Purchase", id));
        }
        txn.commit().await?;

        info!(purchase_id = %id, "purchase deleted");
        self.event_sender.send_or_log(Event::PurchaseDeleted(id));
        Ok(())
    }
}
