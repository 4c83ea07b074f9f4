use crate::{
    db::DbPool,
    entities::{
        neighbor::{self, Entity as Neighbor},
        neighbor_history::{self, Entity as NeighborHistory},
        purchase::{self, Entity as Purchase},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateNeighborRequest {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    pub dob: NaiveDate,
    #[validate(range(min = 0, max = 150, message = "age must be between 0 and 150"))]
    pub age: i32,
    #[validate(length(min = 1, message = "gender is required"))]
    pub gender: String,
    #[validate(length(min = 1, message = "zipcode is required"))]
    pub zipcode: String,
}

/// Exact-match filters for the neighbor list.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct NeighborFilter {
    pub gender: Option<String>,
    pub age: Option<i32>,
    pub zipcode: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NeighborDetail {
    #[serde(flatten)]
    pub neighbor: neighbor::Model,
    /// Purchase ids in the order they were linked
    pub history: Vec<Uuid>,
}

/// How a sale identifies the neighbor it is made for.
#[derive(Debug, Clone, PartialEq)]
pub enum NeighborIdentity {
    Existing(Uuid),
    Demographics {
        name: String,
        dob: NaiveDate,
        age: i32,
        gender: String,
        zipcode: String,
    },
}

/// Neighbor record in the older capitalised shape.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LegacyNeighbor {
    #[serde(rename = "Gender")]
    pub gender: String,
    #[serde(rename = "Age", deserialize_with = "lenient_i32")]
    #[schema(value_type = i32)]
    pub age: i32,
    #[serde(rename = "Zipcode", deserialize_with = "lenient_string")]
    #[schema(value_type = String)]
    pub zipcode: String,
    #[serde(rename = "History", default)]
    pub history: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct LegacyImportReport {
    pub imported: usize,
    pub linked_purchases: usize,
    pub skipped_history: usize,
    pub neighbor_ids: Vec<Uuid>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn lenient_i32<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = lenient_string(deserializer)?;
    value
        .trim()
        .parse::<i32>()
        .map_err(|_| serde::de::Error::custom(format!("invalid age: {}", value)))
}

impl LegacyNeighbor {
    /// Canonical form of a legacy record; name and date of birth stay empty.
    pub fn to_active_model(&self) -> neighbor::ActiveModel {
        neighbor::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(None),
            dob: Set(None),
            age: Set(self.age),
            gender: Set(self.gender.trim().to_string()),
            zipcode: Set(self.zipcode.trim().to_string()),
            created_at: Set(Utc::now()),
        }
    }
}

/// Finds the neighbor a sale refers to, creating one on first sight of a (name, dob) pair.
///
/// Returns the neighbor and whether it was created by this call.
pub(crate) async fn resolve_neighbor<C>(
    conn: &C,
    identity: &NeighborIdentity,
) -> Result<(neighbor::Model, bool), ServiceError>
where
    C: ConnectionTrait,
{
    match identity {
        NeighborIdentity::Existing(id) => {
            let found = Neighbor::find_by_id(*id)
                .one(conn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Neighbor", id))?;
            Ok((found, false))
        }
        NeighborIdentity::Demographics {
            name,
            dob,
            age,
            gender,
            zipcode,
        } => {
            let name = name.trim();
            let existing = Neighbor::find()
                .filter(neighbor::Column::Name.eq(name))
                .filter(neighbor::Column::Dob.eq(*dob))
                .order_by_asc(neighbor::Column::CreatedAt)
                .one(conn)
                .await?;
            if let Some(found) = existing {
                debug!(neighbor_id = %found.id, "matched existing neighbor");
                return Ok((found, false));
            }

            let created = neighbor::ActiveModel {
                id: Set(Uuid::new_v4()),
                name: Set(Some(name.to_string())),
                dob: Set(Some(*dob)),
                age: Set(*age),
                gender: Set(gender.trim().to_string()),
                zipcode: Set(zipcode.trim().to_string()),
                created_at: Set(Utc::now()),
            }
            .insert(conn)
            .await?;
            info!(neighbor_id = %created.id, "registered neighbor from sale");
            Ok((created, true))
        }
    }
}

/// Appends a purchase to the end of a neighbor's history.
pub(crate) async fn append_history<C>(
    conn: &C,
    neighbor_id: Uuid,
    purchase_id: Uuid,
) -> Result<neighbor_history::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let position = NeighborHistory::find()
        .filter(neighbor_history::Column::NeighborId.eq(neighbor_id))
        .count(conn)
        .await?;

    let link = neighbor_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        neighbor_id: Set(neighbor_id),
        purchase_id: Set(purchase_id),
        position: Set(i32::try_from(position).unwrap_or(i32::MAX)),
        linked_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;
    Ok(link)
}

async fn history_of<C>(conn: &C, neighbor_id: Uuid) -> Result<Vec<Uuid>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(NeighborHistory::find()
        .filter(neighbor_history::Column::NeighborId.eq(neighbor_id))
        .order_by_asc(neighbor_history::Column::Position)
        .order_by_asc(neighbor_history::Column::LinkedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(|h| h.purchase_id)
        .collect())
}

/// Service for the neighbor registry
#[derive(Clone)]
pub struct NeighborService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl NeighborService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, filter: NeighborFilter) -> Result<Vec<neighbor::Model>, ServiceError> {
        let mut query = Neighbor::find();
        if let Some(gender) = filter.gender.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
            query = query.filter(neighbor::Column::Gender.eq(gender));
        }
        if let Some(age) = filter.age {
            query = query.filter(neighbor::Column::Age.eq(age));
        }
        if let Some(zip) = filter.zipcode.as_deref().map(str::trim).filter(|z| !z.is_empty()) {
            query = query.filter(neighbor::Column::Zipcode.eq(zip));
        }
        Ok(query
            .order_by_asc(neighbor::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<NeighborDetail, ServiceError> {
        let neighbor = Neighbor::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Neighbor", id))?;
        let history = history_of(&*self.db, id).await?;
        Ok(NeighborDetail { neighbor, history })
    }

    #[instrument(skip(self))]
    pub async fn history(&self, id: Uuid) -> Result<Vec<Uuid>, ServiceError> {
        Ok(self.get(id).await?.history)
    }

    #[instrument(skip(self, request))]
    pub async fn create(
        &self,
        request: CreateNeighborRequest,
    ) -> Result<NeighborDetail, ServiceError> {
        request.validate()?;
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ServiceError::ValidationError("name is required".into()));
        }

        let created = neighbor::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(Some(name.to_string())),
            dob: Set(Some(request.dob)),
            age: Set(request.age),
            gender: Set(request.gender.trim().to_string()),
            zipcode: Set(request.zipcode.trim().to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        info!(neighbor_id = %created.id, "neighbor registered");
        self.event_sender
            .send_or_log(Event::NeighborRegistered(created.id));
        Ok(NeighborDetail {
            neighbor: created,
            history: Vec::new(),
        })
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        NeighborHistory::delete_many()
            .filter(neighbor_history::Column::NeighborId.eq(id))
            .exec(&txn)
            .await?;
        let result = Neighbor::delete_by_id(id).exec(&txn).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Neighbor", id));
        }
        txn.commit().await?;

        info!(neighbor_id = %id, "neighbor deleted");
        self.event_sender.send_or_log(Event::NeighborDeleted(id));
        Ok(())
    }

    /// Converts legacy records into canonical neighbors. History entries that
    /// point at purchases present in the ledger are linked, the rest are skipped.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn import_legacy(
        &self,
        records: Vec<LegacyNeighbor>,
    ) -> Result<LegacyImportReport, ServiceError> {
        let mut report = LegacyImportReport::default();
        let txn = self.db.begin().await?;

        for record in &records {
            if record.gender.trim().is_empty() || record.zipcode.trim().is_empty() {
                return Err(ServiceError::ValidationError(
                    "legacy neighbors need Gender and Zipcode".into(),
                ));
            }
            if !(0..=150).contains(&record.age) {
                return Err(ServiceError::ValidationError(format!(
                    "legacy neighbor age {} is out of range",
                    record.age
                )));
            }

            let created = record.to_active_model().insert(&txn).await?;
            for entry in &record.history {
                let purchase_id = match Uuid::parse_str(entry.trim()) {
                    Ok(id) => id,
                    Err(_) => {
                        report.skipped_history += 1;
                        continue;
                    }
                };
                if Purchase::find()
                    .filter(purchase::Column::Id.eq(purchase_id))
                    .count(&txn)
                    .await?
                    == 0
                {
                    report.skipped_history += 1;
                    continue;
                }
                append_history(&txn, created.id, purchase_id).await?;
                report.linked_purchases += 1;
            }
            report.imported += 1;
            report.neighbor_ids.push(created.id);
        }
        txn.commit().await?;

        if report.skipped_history > 0 {
            warn!(
                skipped = report.skipped_history,
                "legacy history entries without a matching purchase were skipped"
            );
        }
        info!(imported = report.imported, "legacy neighbors imported");
        for id in &report.neighbor_ids {
            self.event_sender.send_or_log(Event::NeighborRegistered(*id));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_shape_accepts_numeric_fields() {
        let raw = r#"[
            {"Gender": "F", "Age": "34", "Zipcode": 60614, "History": ["x"]},
            {"Gender": "M", "Age": 70, "Zipcode": "60615"}
        ]"#;
        let parsed: Vec<LegacyNeighbor> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed[0].age, 34);
        assert_eq!(parsed[0].zipcode, "60614");
        assert_eq!(parsed[0].history, vec!["x".to_string()]);
        assert_eq!(parsed[1].age, 70);
        assert!(parsed[1].history.is_empty());
    }

    #[test]
    fn legacy_conversion_drops_identity_fields() {
        let legacy = LegacyNeighbor {
            gender: " F ".into(),
            age: 40,
            zipcode: "60614".into(),
            history: vec![],
        };
        let active = legacy.to_active_model();
        assert_eq!(active.name, Set(None));
        assert_eq!(active.dob, Set(None));
        assert_eq!(active.gender, Set("F".to_string()));
    }

    #[test]
    fn create_request_requires_demographics() {
        let request = CreateNeighborRequest {
            name: String::new(),
            dob: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            age: 200,
            gender: String::new(),
            zipcode: "60614".into(),
        };
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("age"));
        assert!(fields.contains_key("gender"));
    }
}
