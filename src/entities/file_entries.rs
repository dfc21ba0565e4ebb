use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const TYPE_FILE: &str = "file";
pub const TYPE_FOLDER: &str = "folder";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub owner_id: String,
    #[sea_orm(indexed)]
    pub parent_id: Option<String>,
    #[sea_orm(column_name = "type")]
    pub entry_type: String, // "file" or "folder"
    #[sea_orm(default_expr = "Expr::value(0)")]
    pub file_size: i64,
    pub created_at: Option<DateTimeUtc>,
    pub deleted_at: Option<DateTimeUtc>,
}

impl Model {
    pub fn is_folder(&self) -> bool {
        self.entry_type == TYPE_FOLDER
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::OwnerId",
        to = "super::users::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Owner,
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentId",
        to = "Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Parent,
    #[sea_orm(has_many = "super::file_entry_models::Entity")]
    FileEntryModels,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl Related<super::file_entry_models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FileEntryModels.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
