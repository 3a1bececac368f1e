// src/repository/translation_transaction_repository.rs

use crate::domain::translation_transaction_model::{self, Entity as TransactionEntity};
use sea_orm::entity::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ConnectionTrait, DbConn, DbErr, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};

#[derive(Debug, Clone)]
pub struct TranslationTransactionRepository {
    db: DbConn,
}

impl TranslationTransactionRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    /// idempotency_key を確保する。既に同じキーの記録があれば false
    pub async fn insert_if_absent_in<C: ConnectionTrait>(
        conn: &C,
        transaction: translation_transaction_model::Model,
    ) -> Result<bool, DbErr> {
        let inserted = TransactionEntity::insert(transaction.into_active_model().reset_all())
            .on_conflict(
                OnConflict::column(translation_transaction_model::Column::IdempotencyKey)
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

    pub async fn find_by_key_in<C: ConnectionTrait>(
        conn: &C,
        idempotency_key: &str,
    ) -> Result<Option<translation_transaction_model::Model>, DbErr> {
        TransactionEntity::find()
            .filter(translation_transaction_model::Column::IdempotencyKey.eq(idempotency_key))
            .one(conn)
            .await
    }

    pub async fn find_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<translation_transaction_model::Model>, DbErr> {
        Self::find_by_key_in(&self.db, idempotency_key).await
    }

    pub async fn list(
        &self,
        company_name: Option<&str>,
        limit: u64,
        skip: u64,
    ) -> Result<(Vec<translation_transaction_model::Model>, u64), DbErr> {
        let mut query = TransactionEntity::find();
        if let Some(company_name) = company_name {
            query = query
                .filter(translation_transaction_model::Column::CompanyName.eq(company_name));
        }

        let total = query.clone().count(&self.db).await?;
        let items = query
            .order_by_desc(translation_transaction_model::Column::CreatedAt)
            .order_by_desc(translation_transaction_model::Column::Id)
            .offset(skip)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok((items, total))
    }
}
