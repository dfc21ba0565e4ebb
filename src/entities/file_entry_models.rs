use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const MODEL_TYPE_USER: &str = "user";

/// Grants a model (currently only users) permissions on a single file entry.
///
/// Uniqueness of `(model_id, file_entry_id)` is enforced when attaching, not
/// by a table constraint.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file_entry_models")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(indexed)]
    pub file_entry_id: String,
    #[sea_orm(indexed)]
    pub model_id: String,
    pub model_type: String,
    /// JSON encoded `SharePermissions`
    pub permissions: String,
    #[sea_orm(default_expr = "Expr::value(false)")]
    pub owner: bool,
    #[sea_orm(default_expr = "Expr::value(false)")]
    pub premium: bool,
    #[sea_orm(default_expr = "Expr::value(0)")]
    pub price: i64,
    #[sea_orm(default_expr = "Expr::value(false)")]
    pub paid: bool,
    pub created_at: Option<DateTimeUtc>,
    pub updated_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::file_entries::Entity",
        from = "Column::FileEntryId",
        to = "super::file_entries::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    FileEntries,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::ModelId",
        to = "super::users::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Users,
}

impl Related<super::file_entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FileEntries.def()
    }
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
