use crate::{
    db::DbPool,
    entities::{
        edit_log::{self, Entity as EditLog},
        edit_log_change::{self, Entity as EditLogChange},
        item::{self, Entity as Item},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{parse_id, BatchReport},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct ItemSnapshot {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(range(min = 0, message = "current_quantity cannot be negative"))]
    pub current_quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EditChange {
    pub item_id: Uuid,
    pub prev_item: ItemSnapshot,
    pub new_item: ItemSnapshot,
}

/// One save action in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EditLogRecord {
    pub id: Uuid,
    pub edited_at: DateTime<Utc>,
    pub editor: String,
    pub restock: bool,
    pub changes: Vec<EditChange>,
}

impl EditLogRecord {
    fn from_parts(log: edit_log::Model, mut changes: Vec<edit_log_change::Model>) -> Self {
        changes.sort_by_key(|c| c.position);
        Self {
            id: log.id,
            edited_at: log.edited_at,
            editor: log.editor,
            restock: log.restock,
            changes: changes
                .into_iter()
                .map(|c| EditChange {
                    item_id: c.item_id,
                    prev_item: ItemSnapshot {
                        name: c.prev_name,
                        current_quantity: c.prev_quantity,
                    },
                    new_item: ItemSnapshot {
                        name: c.new_name,
                        current_quantity: c.new_quantity,
                    },
                })
                .collect(),
        }
    }
}

/// Body of `POST /editLog`: records a change without touching the item.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateEditLogRequest {
    pub item_id: String,
    #[validate(length(min = 1, message = "editor is required"))]
    pub editor: String,
    #[serde(default)]
    pub restock: bool,
    #[validate]
    pub new_item: ItemSnapshot,
    pub edited_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ItemEdit {
    pub id: String,
    pub name: Option<String>,
    pub current_quantity: i32,
}

/// Body of `POST /item/edits`: the manual save flow over several items.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SaveEditsRequest {
    #[validate(length(min = 1, message = "editor is required"))]
    pub editor: String,
    #[serde(default)]
    pub restock: bool,
    #[validate(length(min = 1, message = "items must not be empty"))]
    pub items: Vec<ItemEdit>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SaveEditsReport {
    /// Absent when no item could be saved
    pub edit_log_id: Option<Uuid>,
    #[serde(flatten)]
    pub report: BatchReport,
}

async fn insert_change<C>(
    conn: &C,
    edit_log_id: Uuid,
    position: i32,
    before: &item::Model,
    after: &ItemSnapshot,
) -> Result<edit_log_change::Model, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(edit_log_change::ActiveModel {
        id: Set(Uuid::new_v4()),
        edit_log_id: Set(edit_log_id),
        item_id: Set(before.id),
        prev_name: Set(before.name.clone()),
        prev_quantity: Set(before.current_quantity),
        new_name: Set(after.name.clone()),
        new_quantity: Set(after.current_quantity),
        position: Set(position),
    }
    .insert(conn)
    .await?)
}

async fn find_item<C>(conn: &C, id: Uuid) -> Result<item::Model, ServiceError>
where
    C: ConnectionTrait,
{
    Item::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Item", id))
}

fn required_editor(raw: &str) -> Result<String, ServiceError> {
    let editor = raw.trim();
    if editor.is_empty() {
        return Err(ServiceError::ValidationError("editor is required".into()));
    }
    Ok(editor.to_string())
}

/// Service for the manual edit audit trail
#[derive(Clone)]
pub struct EditLogService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl EditLogService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// All logs, newest first.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<EditLogRecord>, ServiceError> {
        let logs = EditLog::find()
            .order_by_desc(edit_log::Column::EditedAt)
            .all(&*self.db)
            .await?;
        let mut changes: HashMap<Uuid, Vec<edit_log_change::Model>> = HashMap::new();
        for change in EditLogChange::find().all(&*self.db).await? {
            changes.entry(change.edit_log_id).or_default().push(change);
        }
        Ok(logs
            .into_iter()
            .map(|log| {
                let own = changes.remove(&log.id).unwrap_or_default();
                EditLogRecord::from_parts(log, own)
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<EditLogRecord, ServiceError> {
        let log = EditLog::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("EditLog", id))?;
        let changes = EditLogChange::find()
            .filter(edit_log_change::Column::EditLogId.eq(id))
            .all(&*self.db)
            .await?;
        Ok(EditLogRecord::from_parts(log, changes))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        EditLogChange::delete_many()
            .filter(edit_log_change::Column::EditLogId.eq(id))
            .exec(&txn)
            .await?;
        let result = EditLog::delete_by_id(id).exec(&txn).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("EditLog", id));
        }
        txn.commit().await?;

        info!(edit_log_id = %id, "edit log deleted");
        self.event_sender.send_or_log(Event::EditLogDeleted(id));
        Ok(())
    }

    /// Writes a one-change log. The before-image is read from the store, the item is left as is.
    #[instrument(skip(self, request), fields(editor = %request.editor))]
    pub async fn create(&self, request: CreateEditLogRequest) -> Result<EditLogRecord, ServiceError> {
        request.validate()?;
        let editor = required_editor(&request.editor)?;
        let item_id = parse_id("item_id", &request.item_id)?;

        let txn = self.db.begin().await?;
        let before = find_item(&txn, item_id).await?;

        let log = edit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            edited_at: Set(request.edited_at.unwrap_or_else(Utc::now)),
            editor: Set(editor),
            restock: Set(request.restock),
        }
        .insert(&txn)
        .await?;
        let change = insert_change(&txn, log.id, 0, &before, &request.new_item).await?;
        txn.commit().await?;

        info!(edit_log_id = %log.id, item_id = %item_id, "edit log recorded");
        Ok(EditLogRecord::from_parts(log, vec![change]))
    }

    /// Applies manual edits item by item. Each item is re-read, updated and
    /// logged in its own transaction; a failure on one item leaves the others saved.
    #[instrument(skip(self, request), fields(editor = %request.editor, items = request.items.len()))]
    pub async fn save_edits(&self, request: SaveEditsRequest) -> Result<SaveEditsReport, ServiceError> {
        request.validate()?;
        let editor = required_editor(&request.editor)?;

        let log_id = Uuid::new_v4();
        let edited_at = Utc::now();
        let mut header_written = false;
        let mut position = 0;
        let mut report = BatchReport::default();

        for edit in &request.items {
            let result = self
                .apply_edit(
                    log_id,
                    edited_at,
                    &editor,
                    request.restock,
                    !header_written,
                    position,
                    edit,
                )
                .await;
            match result {
                Ok((before, after)) => {
                    header_written = true;
                    position += 1;
                    report.record_success(edit.id.clone());
                    crate::metrics::EDIT_CHANGES_APPLIED.inc();
                    self.event_sender.send_or_log(Event::InventoryEdited {
                        edit_log_id: log_id,
                        item_id: before.id,
                        previous_quantity: before.current_quantity,
                        new_quantity: after.current_quantity,
                        restock: request.restock,
                    });
                }
                Err(e) => {
                    warn!(item = %edit.id, error = %e, "manual edit failed");
                    report.record_failure(edit.id.clone(), &e);
                }
            }
        }

        info!(
            edit_log_id = %log_id,
            succeeded = report.succeeded,
            failed = report.failed,
            "manual edits saved"
        );
        Ok(SaveEditsReport {
            edit_log_id: header_written.then_some(log_id),
            report,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_edit(
        &self,
        log_id: Uuid,
        edited_at: DateTime<Utc>,
        editor: &str,
        restock: bool,
        write_header: bool,
        position: i32,
        edit: &ItemEdit,
    ) -> Result<(item::Model, ItemSnapshot), ServiceError> {
        let item_id = parse_id("id", &edit.id)?;
        if edit.current_quantity < 0 {
            return Err(ServiceError::ValidationError(
                "current_quantity cannot be negative".into(),
            ));
        }

        let txn = self.db.begin().await?;
        let before = find_item(&txn, item_id).await?;

        let name = match edit.name.as_deref().map(str::trim) {
            Some("") => {
                return Err(ServiceError::ValidationError("name cannot be empty".into()));
            }
            Some(name) => name.to_string(),
            None => before.name.clone(),
        };
        let after = ItemSnapshot {
            name,
            current_quantity: edit.current_quantity,
        };

        let mut active: item::ActiveModel = before.clone().into();
        active.name = Set(after.name.clone());
        active.current_quantity = Set(after.current_quantity);
        if restock {
            active.last_restock_quantity = Set(Some(after.current_quantity));
            active.last_restock_date = Set(Some(edited_at));
        }
        active.update(&txn).await?;

        if write_header {
            edit_log::ActiveModel {
                id: Set(log_id),
                edited_at: Set(edited_at),
                editor: Set(editor.to_string()),
                restock: Set(restock),
            }
            .insert(&txn)
            .await?;
        }
        insert_change(&txn, log_id, position, &before, &after).await?;
        txn.commit().await?;

        Ok((before, after))
    }
}
