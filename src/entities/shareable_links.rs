use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shareable_links")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub hash: String,
    pub entry_id: String,
    pub user_id: String,
    pub allow_edit: bool,
    pub allow_download: bool,
    pub password_hash: Option<String>,
    pub expires_at: Option<DateTimeUtc>,
    pub created_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::file_entries::Entity",
        from = "Column::EntryId",
        to = "super::file_entries::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    FileEntries,
}

impl Related<super::file_entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FileEntries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
