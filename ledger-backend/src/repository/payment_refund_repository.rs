// src/repository/payment_refund_repository.rs

use crate::domain::payment_refund_model::{self, Entity as RefundEntity};
use sea_orm::entity::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, DbConn, DbErr, QueryFilter, QueryOrder};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PaymentRefundRepository {
    db: DbConn,
}

impl PaymentRefundRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    /// (payment_id, refund_id) のユニークインデックスで守られた追記。
    /// 既に同じ refund_id があれば false
    pub async fn insert_if_absent_in<C: ConnectionTrait>(
        conn: &C,
        refund: payment_refund_model::Model,
    ) -> Result<bool, DbErr> {
        let inserted = RefundEntity::insert(refund.into_active_model().reset_all())
            .on_conflict(
                OnConflict::columns([
                    payment_refund_model::Column::PaymentId,
                    payment_refund_model::Column::RefundId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(conn)
            .await;

        match inserted {
            Ok(_) => Ok(true),
            Err(DbErr::RecordNotInserted) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn find_by_refund_id_in<C: ConnectionTrait>(
        conn: &C,
        payment_id: Uuid,
        refund_id: &str,
    ) -> Result<Option<payment_refund_model::Model>, DbErr> {
        RefundEntity::find()
            .filter(payment_refund_model::Column::PaymentId.eq(payment_id))
            .filter(payment_refund_model::Column::RefundId.eq(refund_id))
            .one(conn)
            .await
    }

    pub async fn find_by_refund_id(
        &self,
        payment_id: Uuid,
        refund_id: &str,
    ) -> Result<Option<payment_refund_model::Model>, DbErr> {
        Self::find_by_refund_id_in(&self.db, payment_id, refund_id).await
    }

    /// 支払いに紐づく返金（記録順）
    pub async fn find_by_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Vec<payment_refund_model::Model>, DbErr> {
        RefundEntity::find()
            .filter(payment_refund_model::Column::PaymentId.eq(payment_id))
            .order_by_asc(payment_refund_model::Column::CreatedAt)
            .order_by_asc(payment_refund_model::Column::Id)
            .all(&self.db)
            .await
    }
}
