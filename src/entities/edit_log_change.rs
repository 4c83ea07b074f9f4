use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Before/after snapshot of one item. `item_id` is recorded by value only.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "edit_log_changes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub edit_log_id: Uuid,
    pub item_id: Uuid,
    pub prev_name: String,
    pub prev_quantity: i32,
    pub new_name: String,
    pub new_quantity: i32,
    pub position: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::edit_log::Entity",
        from = "Column::EditLogId",
        to = "super::edit_log::Column::Id"
    )]
    EditLog,
}

impl Related<super::edit_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EditLog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
