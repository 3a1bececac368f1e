// src/domain/payment_refund_model.rs

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 決済に紐づく返金。追記のみで更新・削除はしない
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_refunds")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub payment_id: Uuid,
    /// 親の決済内で一意
    pub refund_id: String,

    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub idempotency_key: String,

    #[sea_orm(nullable)]
    pub reason: Option<String>,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "crate::domain::payment_model::Entity",
        from = "Column::PaymentId",
        to = "crate::domain::payment_model::Column::Id"
    )]
    Payment,
}

impl Related<crate::domain::payment_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

pub const REFUND_STATUS_COMPLETED: &str = "completed";
