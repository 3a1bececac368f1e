// src/domain/usage_period_model.rs

use crate::error::AppError;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// サブスクリプションに属する利用期間。削除はせず監査証跡として残す
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "usage_periods")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub subscription_id: Uuid,

    /// 追加順（1始まり）
    pub sequence: i32,

    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,

    pub units_allocated: i64,
    pub units_used: i64,
    /// units_allocated - units_used のキャッシュ。常に同時に更新する
    pub units_remaining: i64,
    pub promotional_units_used: i64,

    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "crate::domain::subscription_model::Entity",
        from = "Column::SubscriptionId",
        to = "crate::domain::subscription_model::Column::Id"
    )]
    Subscription,
}

impl Related<crate::domain::subscription_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscription.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// 1回の消費をどの枠から引くか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsumptionPlan {
    pub regular: i64,
    pub promotional: i64,
}

impl ConsumptionPlan {
    pub fn total(&self) -> i64 {
        self.regular + self.promotional
    }
}

impl Model {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.period_start <= at && at <= self.period_end
    }

    /// この期間で未使用のプロモーション枠
    pub fn promotional_remaining(&self, promotional_allowance: i64) -> i64 {
        (promotional_allowance - self.promotional_units_used).max(0)
    }

    pub fn available(&self, promotional_allowance: i64) -> i64 {
        self.units_remaining
            .max(0)
            .saturating_add(self.promotional_remaining(promotional_allowance))
    }

    /// 消費計画を立てる。不足する場合は何も変更しない前提で InsufficientUnits を返す
    pub fn plan_consumption(
        &self,
        units: i64,
        promotional_allowance: i64,
        prefer_promotional: bool,
    ) -> Result<ConsumptionPlan, AppError> {
        if units <= 0 {
            return Err(AppError::invalid_argument(
                "units",
                "must be greater than 0",
            ));
        }

        let available = self.available(promotional_allowance);
        if units > available {
            return Err(AppError::InsufficientUnits {
                requested: units,
                available,
            });
        }

        let promo_left = self.promotional_remaining(promotional_allowance);
        let plan = if prefer_promotional {
            let promotional = units.min(promo_left);
            ConsumptionPlan {
                regular: units - promotional,
                promotional,
            }
        } else {
            let regular = units.min(self.units_remaining.max(0));
            ConsumptionPlan {
                regular,
                promotional: units - regular,
            }
        };

        Ok(plan)
    }
}

/// 現在の利用期間を選ぶ。now を含む期間（複数あれば最後に追加されたもの）、
/// なければ最後に追加された期間
pub fn select_current_period(periods: &[Model], now: DateTime<Utc>) -> Option<&Model> {
    periods
        .iter()
        .filter(|p| p.contains(now))
        .max_by_key(|p| p.sequence)
        .or_else(|| periods.iter().max_by_key(|p| p.sequence))
}
