use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const TYPE_ADD: &str = "add";
pub const TYPE_SUBTRACT: &str = "subtract";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Account holder whose balance this row moved
    #[sea_orm(indexed)]
    pub user_id: String,
    pub payment_processor: String, // "stripe" or "paypal"
    /// Identifier assigned by the payment processor
    #[sea_orm(unique)]
    pub transaction_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[sea_orm(column_name = "type")]
    pub kind: String, // "add" or "subtract"
    pub file_entry_id: Option<String>,
    pub model_id: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Users,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
