// src/repository/subscription_repository.rs

use crate::domain::subscription_model::{
    self, ActiveModel as SubscriptionActiveModel, Entity as SubscriptionEntity, SubscriptionStatus,
};
use crate::types::SortOrder;
use chrono::{DateTime, Utc};
use sea_orm::entity::*;
use sea_orm::sea_query::Expr;
use sea_orm::{
    DbBackend, DbConn, DbErr, FromQueryResult, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, Statement,
};
use uuid::Uuid;

/// サブスクリプション一覧の絞り込み条件
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub company_name: Option<String>,
    pub status: Option<SubscriptionStatus>,
    /// start_date の範囲
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromQueryResult)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone)]
pub struct SubscriptionRepository {
    db: DbConn,
}

impl SubscriptionRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<subscription_model::Model>, DbErr> {
        SubscriptionEntity::find_by_id(id).one(&self.db).await
    }

    pub async fn create(
        &self,
        create_subscription: CreateSubscription,
    ) -> Result<subscription_model::Model, DbErr> {
        let now = Utc::now();

        let new_subscription = SubscriptionActiveModel {
            id: Set(Uuid::new_v4()),
            company_name: Set(create_subscription.company_name),
            unit_kind: Set(create_subscription.unit_kind),
            units_per_cycle: Set(create_subscription.units_per_cycle),
            price_per_unit: Set(create_subscription.price_per_unit),
            promotional_units: Set(create_subscription.promotional_units),
            discount: Set(create_subscription.discount),
            price: Set(create_subscription.price),
            currency: Set(create_subscription.currency),
            start_date: Set(create_subscription.start_date),
            end_date: Set(create_subscription.end_date),
            status: Set(SubscriptionStatus::Active.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        new_subscription.insert(&self.db).await
    }

    pub async fn find_by_company(
        &self,
        company_name: &str,
    ) -> Result<Vec<subscription_model::Model>, DbErr> {
        SubscriptionEntity::find()
            .filter(subscription_model::Column::CompanyName.eq(company_name))
            .order_by_asc(subscription_model::Column::StartDate)
            .all(&self.db)
            .await
    }

    pub async fn list(
        &self,
        filter: &SubscriptionFilter,
        limit: u64,
        skip: u64,
        sort: SortOrder,
    ) -> Result<(Vec<subscription_model::Model>, u64), DbErr> {
        let mut query = SubscriptionEntity::find();

        if let Some(company_name) = &filter.company_name {
            query = query.filter(subscription_model::Column::CompanyName.eq(company_name.as_str()));
        }
        if let Some(status) = filter.status {
            query = query.filter(subscription_model::Column::Status.eq(status.as_str()));
        }
        if let Some(from) = filter.from {
            query = query.filter(subscription_model::Column::StartDate.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(subscription_model::Column::StartDate.lte(to));
        }

        let total = query.clone().count(&self.db).await?;
        let items = query
            .order_by(subscription_model::Column::StartDate, sort.to_order())
            .order_by(subscription_model::Column::Id, sort.to_order())
            .offset(skip)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok((items, total))
    }

    /// 現在のステータスが from の場合のみ to に変更する
    pub async fn transition_status(
        &self,
        id: Uuid,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> Result<bool, DbErr> {
        let result = SubscriptionEntity::update_many()
            .col_expr(subscription_model::Column::Status, Expr::value(to.as_str()))
            .col_expr(subscription_model::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(subscription_model::Column::Id.eq(id))
            .filter(subscription_model::Column::Status.eq(from.as_str()))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// end_date が as_of より前の active を expired にする。戻り値は更新件数
    pub async fn expire_ended(&self, as_of: DateTime<Utc>) -> Result<u64, DbErr> {
        let result = SubscriptionEntity::update_many()
            .col_expr(
                subscription_model::Column::Status,
                Expr::value(SubscriptionStatus::Expired.as_str()),
            )
            .col_expr(subscription_model::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(subscription_model::Column::Status.eq(SubscriptionStatus::Active.as_str()))
            .filter(subscription_model::Column::EndDate.is_not_null())
            .filter(subscription_model::Column::EndDate.lt(as_of))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    pub async fn count_by_status(&self) -> Result<Vec<StatusCount>, DbErr> {
        StatusCount::find_by_statement(Statement::from_string(
            DbBackend::Postgres,
            r#"SELECT status, COUNT(*)::BIGINT AS count
               FROM subscriptions
               GROUP BY status
               ORDER BY status"#,
        ))
        .all(&self.db)
        .await
    }
}

/// サブスクリプション作成用構造体
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub company_name: String,
    pub unit_kind: String,
    pub units_per_cycle: i64,
    pub price_per_unit: rust_decimal::Decimal,
    pub promotional_units: i64,
    pub discount: rust_decimal::Decimal,
    pub price: i64,
    pub currency: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}
