// src/repository/payment_repository.rs

use crate::domain::payment_model::{self, Entity as PaymentEntity, PaymentStatus};
use crate::types::SortOrder;
use chrono::{DateTime, Utc};
use sea_orm::entity::*;
use sea_orm::prelude::Json;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ConnectionTrait, DbBackend, DbConn, DbErr, FromQueryResult, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Statement,
};
use uuid::Uuid;

/// 支払い一覧の絞り込み条件
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub company_name: Option<String>,
    pub status: Option<PaymentStatus>,
    /// payment_date の範囲
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// 通貨ごとの支払い集計（最小通貨単位）
#[derive(Debug, Clone, FromQueryResult)]
pub struct CurrencyTotals {
    pub currency: String,
    pub payments: i64,
    pub gross: i64,
    pub refunded: i64,
}

#[derive(Debug, Clone)]
pub struct PaymentRepository {
    db: DbConn,
}

impl PaymentRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub async fn find_by_gateway_id(
        &self,
        gateway_transaction_id: &str,
    ) -> Result<Option<payment_model::Model>, DbErr> {
        Self::find_by_gateway_id_in(&self.db, gateway_transaction_id).await
    }

    pub async fn find_by_gateway_id_in<C: ConnectionTrait>(
        conn: &C,
        gateway_transaction_id: &str,
    ) -> Result<Option<payment_model::Model>, DbErr> {
        PaymentEntity::find()
            .filter(payment_model::Column::GatewayTransactionId.eq(gateway_transaction_id))
            .one(conn)
            .await
    }

    pub async fn find_by_id_in<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
    ) -> Result<Option<payment_model::Model>, DbErr> {
        PaymentEntity::find_by_id(id).one(conn).await
    }

    /// gateway_transaction_id のユニークインデックスで守られた挿入。
    /// 既に存在すれば false（再送とみなす）
    pub async fn insert_if_absent(&self, payment: payment_model::Model) -> Result<bool, DbErr> {
        let inserted = PaymentEntity::insert(payment.into_active_model().reset_all())
            .on_conflict(
                OnConflict::column(payment_model::Column::GatewayTransactionId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec(&self.db)
            .await;

        match inserted {
            Ok(_) => Ok(true),
            Err(DbErr::RecordNotInserted) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 現在のステータスが from の場合のみ to に進める。
    /// 通知に metadata があれば既存の metadata にマージする（同じキーは通知側が優先）
    pub async fn transition_status(
        &self,
        id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        metadata: &Json,
    ) -> Result<bool, DbErr> {
        let mut update = PaymentEntity::update_many()
            .col_expr(payment_model::Column::Status, Expr::value(to.as_str()))
            .col_expr(payment_model::Column::UpdatedAt, Expr::value(Utc::now()));

        if metadata.as_object().is_some_and(|m| !m.is_empty()) {
            update = update.col_expr(
                payment_model::Column::Metadata,
                Expr::cust_with_values(r#""metadata" || $1"#, [metadata.clone()]),
            );
        }

        let result = update
            .filter(payment_model::Column::Id.eq(id))
            .filter(payment_model::Column::Status.eq(from.as_str()))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// 連携の失敗を記録する。未連携の走査はこの時刻が古いものから行う
    pub async fn record_link_attempt(&self, id: Uuid) -> Result<(), DbErr> {
        PaymentEntity::update_many()
            .col_expr(
                payment_model::Column::LinkAttempts,
                Expr::col(payment_model::Column::LinkAttempts).add(1),
            )
            .col_expr(
                payment_model::Column::LastLinkAttemptAt,
                Expr::value(Some(Utc::now())),
            )
            .filter(payment_model::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// 返金累計を expected_refunded から refunded_amount に進める。
    /// 返金可能なステータスであり、支払い額を超えない場合のみ更新される
    pub async fn apply_refund_in<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
        expected_refunded: i64,
        refunded_amount: i64,
        status: PaymentStatus,
    ) -> Result<bool, DbErr> {
        let result = PaymentEntity::update_many()
            .col_expr(payment_model::Column::RefundedAmount, Expr::value(refunded_amount))
            .col_expr(payment_model::Column::Status, Expr::value(status.as_str()))
            .col_expr(payment_model::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment_model::Column::Id.eq(id))
            .filter(payment_model::Column::RefundedAmount.eq(expected_refunded))
            .filter(payment_model::Column::Amount.gte(refunded_amount))
            .filter(payment_model::Column::Status.is_in([
                PaymentStatus::Completed.as_str(),
                PaymentStatus::PartiallyRefunded.as_str(),
            ]))
            .exec(conn)
            .await?;

        Ok(result.rows_affected == 1)
    }

    pub async fn list(
        &self,
        filter: &PaymentFilter,
        limit: u64,
        skip: u64,
        sort: SortOrder,
    ) -> Result<(Vec<payment_model::Model>, u64), DbErr> {
        let mut query = PaymentEntity::find();

        if let Some(company_name) = &filter.company_name {
            query = query.filter(payment_model::Column::CompanyName.eq(company_name.as_str()));
        }
        if let Some(status) = filter.status {
            query = query.filter(payment_model::Column::Status.eq(status.as_str()));
        }
        if let Some(from) = filter.from {
            query = query.filter(payment_model::Column::PaymentDate.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(payment_model::Column::PaymentDate.lte(to));
        }

        let total = query.clone().count(&self.db).await?;
        let items = query
            .order_by(payment_model::Column::PaymentDate, sort.to_order())
            .order_by(payment_model::Column::Id, sort.to_order())
            .offset(skip)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok((items, total))
    }

    /// 会社の期間内の支払い（明細書用、古い順）
    pub async fn find_by_company_in_range(
        &self,
        company_name: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<payment_model::Model>, DbErr> {
        let mut query =
            PaymentEntity::find().filter(payment_model::Column::CompanyName.eq(company_name));
        if let Some(from) = from {
            query = query.filter(payment_model::Column::PaymentDate.gte(from));
        }
        if let Some(to) = to {
            query = query.filter(payment_model::Column::PaymentDate.lte(to));
        }

        query
            .order_by_asc(payment_model::Column::PaymentDate)
            .order_by_asc(payment_model::Column::Id)
            .all(&self.db)
            .await
    }

    /// 利用単位を伴う完了済み支払いのうち、まだ利用記録に紐付いていないもの。
    /// 一度も走査で試していないものを先に、失敗したものは最後に試した時刻の古い順
    pub async fn find_unlinked_completed(
        &self,
        limit: u64,
    ) -> Result<Vec<payment_model::Model>, DbErr> {
        PaymentEntity::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"SELECT p.*
                   FROM payments p
                   WHERE p.status = $1
                     AND (p.metadata ->> 'units') IS NOT NULL
                     AND NOT EXISTS (
                         SELECT 1 FROM translation_transactions t
                         WHERE t.idempotency_key = 'payment:' || p.gateway_transaction_id
                     )
                   ORDER BY p.last_link_attempt_at ASC NULLS FIRST, p.payment_date ASC
                   LIMIT $2"#,
                [
                    PaymentStatus::Completed.as_str().into(),
                    (limit as i64).into(),
                ],
            ))
            .all(&self.db)
            .await
    }

    pub async fn count(&self) -> Result<u64, DbErr> {
        PaymentEntity::find().count(&self.db).await
    }

    /// 通貨ごとの売上・返金集計。company_name を指定するとその会社のみ
    pub async fn totals_by_currency(
        &self,
        company_name: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<CurrencyTotals>, DbErr> {
        CurrencyTotals::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"SELECT currency,
                      COUNT(*)::BIGINT AS payments,
                      COALESCE(SUM(amount), 0)::BIGINT AS gross,
                      COALESCE(SUM(refunded_amount), 0)::BIGINT AS refunded
               FROM payments
               WHERE status IN ('completed', 'partially_refunded', 'refunded')
                 AND ($1::TEXT IS NULL OR company_name = $1)
                 AND ($2::TIMESTAMPTZ IS NULL OR payment_date >= $2)
                 AND ($3::TIMESTAMPTZ IS NULL OR payment_date <= $3)
               GROUP BY currency
               ORDER BY currency"#,
            [
                company_name.map(str::to_string).into(),
                from.into(),
                to.into(),
            ],
        ))
        .all(&self.db)
        .await
    }
}
