// src/repository/usage_period_repository.rs

use crate::domain::usage_period_model::{
    self, ActiveModel as UsagePeriodActiveModel, ConsumptionPlan, Entity as UsagePeriodEntity,
};
use chrono::{DateTime, Utc};
use sea_orm::entity::*;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ConnectionTrait, DbBackend, DbConn, DbErr, FromQueryResult, QueryFilter, QueryOrder, Set,
    Statement,
};
use uuid::Uuid;

#[derive(Debug, Clone, Default, FromQueryResult)]
pub struct UsageTotals {
    pub total_allocated: i64,
    pub total_used: i64,
    pub total_remaining: i64,
    pub total_promotional_used: i64,
}

#[derive(Debug, Clone)]
pub struct UsagePeriodRepository {
    db: DbConn,
}

impl UsagePeriodRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DbConn {
        &self.db
    }

    /// サブスクリプションの全期間（追加順）
    pub async fn find_by_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<usage_period_model::Model>, DbErr> {
        Self::find_by_subscription_in(&self.db, subscription_id).await
    }

    pub async fn find_by_subscription_in<C: ConnectionTrait>(
        conn: &C,
        subscription_id: Uuid,
    ) -> Result<Vec<usage_period_model::Model>, DbErr> {
        UsagePeriodEntity::find()
            .filter(usage_period_model::Column::SubscriptionId.eq(subscription_id))
            .order_by_asc(usage_period_model::Column::Sequence)
            .all(conn)
            .await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<usage_period_model::Model>, DbErr> {
        UsagePeriodEntity::find_by_id(id).one(&self.db).await
    }

    /// 次の連番で期間を追加する。同じ連番を並行して取った場合は None
    pub async fn append(
        &self,
        subscription_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        units_allocated: i64,
    ) -> Result<Option<usage_period_model::Model>, DbErr> {
        let latest = UsagePeriodEntity::find()
            .filter(usage_period_model::Column::SubscriptionId.eq(subscription_id))
            .order_by_desc(usage_period_model::Column::Sequence)
            .one(&self.db)
            .await?;
        let sequence = latest.map_or(1, |p| p.sequence + 1);

        let id = Uuid::new_v4();
        let now = Utc::now();
        let new_period = UsagePeriodActiveModel {
            id: Set(id),
            subscription_id: Set(subscription_id),
            sequence: Set(sequence),
            period_start: Set(period_start),
            period_end: Set(period_end),
            units_allocated: Set(units_allocated),
            units_used: Set(0),
            units_remaining: Set(units_allocated),
            promotional_units_used: Set(0),
            last_updated: Set(now),
            created_at: Set(now),
        };

        let inserted = UsagePeriodEntity::insert(new_period)
            .on_conflict(
                OnConflict::columns([
                    usage_period_model::Column::SubscriptionId,
                    usage_period_model::Column::Sequence,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(&self.db)
            .await;

        match inserted {
            Ok(_) => UsagePeriodEntity::find_by_id(id).one(&self.db).await,
            Err(DbErr::RecordNotInserted) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 読み取った時点の値が変わっていない場合だけ消費を反映する（compare-and-set）。
    /// units_remaining >= regular も同じ文で確認するので、負の残量にはならない
    pub async fn consume_in<C: ConnectionTrait>(
        conn: &C,
        observed: &usage_period_model::Model,
        plan: ConsumptionPlan,
    ) -> Result<bool, DbErr> {
        let result = UsagePeriodEntity::update_many()
            .col_expr(
                usage_period_model::Column::UnitsUsed,
                Expr::col(usage_period_model::Column::UnitsUsed).add(plan.regular),
            )
            .col_expr(
                usage_period_model::Column::UnitsRemaining,
                Expr::col(usage_period_model::Column::UnitsRemaining).sub(plan.regular),
            )
            .col_expr(
                usage_period_model::Column::PromotionalUnitsUsed,
                Expr::col(usage_period_model::Column::PromotionalUnitsUsed).add(plan.promotional),
            )
            .col_expr(usage_period_model::Column::LastUpdated, Expr::value(Utc::now()))
            .filter(usage_period_model::Column::Id.eq(observed.id))
            .filter(usage_period_model::Column::UnitsUsed.eq(observed.units_used))
            .filter(
                usage_period_model::Column::PromotionalUnitsUsed.eq(observed.promotional_units_used),
            )
            .filter(usage_period_model::Column::UnitsRemaining.gte(plan.regular))
            .exec(conn)
            .await?;

        Ok(result.rows_affected == 1)
    }

    pub async fn find_by_id_in<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
    ) -> Result<Option<usage_period_model::Model>, DbErr> {
        UsagePeriodEntity::find_by_id(id).one(conn).await
    }

    /// 全サブスクリプションの利用合計
    pub async fn totals(&self) -> Result<UsageTotals, DbErr> {
        let totals = UsageTotals::find_by_statement(Statement::from_string(
            DbBackend::Postgres,
            r#"SELECT COALESCE(SUM(units_allocated), 0)::BIGINT AS total_allocated,
                      COALESCE(SUM(units_used), 0)::BIGINT AS total_used,
                      COALESCE(SUM(units_remaining), 0)::BIGINT AS total_remaining,
                      COALESCE(SUM(promotional_units_used), 0)::BIGINT AS total_promotional_used
               FROM usage_periods"#,
        ))
        .one(&self.db)
        .await?;

        Ok(totals.unwrap_or_default())
    }
}
