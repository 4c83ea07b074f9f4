use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One distribution event. Line items live in `purchase_line_items`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchases")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub neighbor_id: Uuid,
    pub purchase_date: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::purchase_line_item::Entity")]
    LineItems,
    #[sea_orm(has_many = "super::neighbor_history::Entity")]
    NeighborHistory,
}

impl Related<super::purchase_line_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LineItems.def()
    }
}

impl Related<super::neighbor_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::NeighborHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
