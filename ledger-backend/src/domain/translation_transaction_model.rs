// src/domain/translation_transaction_model.rs

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 単位を消費した1件の作業記録。idempotency_key ごとに高々1件
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "translation_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub idempotency_key: String,

    #[sea_orm(nullable)]
    pub company_name: Option<String>,
    #[sea_orm(nullable)]
    pub user_id: Option<Uuid>,
    /// 個人の単発購入ではサブスクリプションを持たない
    #[sea_orm(nullable)]
    pub subscription_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub usage_period_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub payment_id: Option<Uuid>,

    /// 消費した単位の合計（プロモーション分を含む）
    pub units: i64,
    pub promotional_units: i64,

    #[sea_orm(nullable)]
    pub source_language: Option<String>,
    #[sea_orm(nullable)]
    pub target_language: Option<String>,

    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub const TRANSACTION_STATUS_COMPLETED: &str = "completed";

/// 決済から導かれる消費記録の冪等キー
pub fn payment_usage_key(gateway_transaction_id: &str) -> String {
    format!("payment:{}", gateway_transaction_id)
}

/// 翻訳パイプラインの作業単位の冪等キー
pub fn work_item_key(work_item_id: &str) -> String {
    format!("work:{}", work_item_id)
}
