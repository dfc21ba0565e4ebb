use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub email: String,
    pub name: Option<String>,
    /// Earnings available for withdrawal, in minor units of the billing currency
    #[sea_orm(default_expr = "Expr::value(0)")]
    pub balance: i64,
    pub stripe_account_id: Option<String>,
    pub created_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::file_entries::Entity")]
    FileEntries,
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
}

impl Related<super::file_entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FileEntries.def()
    }
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
