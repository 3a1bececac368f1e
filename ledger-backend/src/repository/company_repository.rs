// src/repository/company_repository.rs

use crate::domain::company_model::{self, ActiveModel as CompanyActiveModel, Entity as CompanyEntity};
use crate::domain::subscription_model::{self, SubscriptionStatus};
use chrono::Utc;
use sea_orm::entity::*;
use sea_orm::sea_query::{Expr, OnConflict, Query};
use sea_orm::{
    ConnectionTrait, DbConn, DbErr, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    Set,
};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CompanyRepository {
    db: DbConn,
}

impl CompanyRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    /// 会社名の存在確認（companies.name のユニークインデックスで引く）
    pub async fn exists_by_name(&self, name: &str) -> Result<bool, DbErr> {
        Self::exists_by_name_in(&self.db, name).await
    }

    pub async fn exists_by_name_in<C: ConnectionTrait>(conn: &C, name: &str) -> Result<bool, DbErr> {
        let count = CompanyEntity::find()
            .filter(company_model::Column::Name.eq(name))
            .count(conn)
            .await?;
        Ok(count > 0)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<company_model::Model>, DbErr> {
        CompanyEntity::find()
            .filter(company_model::Column::Name.eq(name))
            .one(&self.db)
            .await
    }

    /// 会社を作成。同名が既にあれば None（ユニークインデックスで判定）
    pub async fn create(
        &self,
        create_company: CreateCompany,
    ) -> Result<Option<company_model::Model>, DbErr> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let new_company = CompanyActiveModel {
            id: Set(id),
            name: Set(create_company.name),
            street: Set(create_company.street),
            city: Set(create_company.city),
            state: Set(create_company.state),
            postal_code: Set(create_company.postal_code),
            country: Set(create_company.country),
            contact_name: Set(create_company.contact_name),
            contact_email: Set(create_company.contact_email),
            contact_phone: Set(create_company.contact_phone),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = CompanyEntity::insert(new_company)
            .on_conflict(
                OnConflict::column(company_model::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .exec(&self.db)
            .await;

        match inserted {
            Ok(_) => CompanyEntity::find_by_id(id).one(&self.db).await,
            Err(DbErr::RecordNotInserted) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list(
        &self,
        limit: u64,
        skip: u64,
    ) -> Result<(Vec<company_model::Model>, u64), DbErr> {
        let query = CompanyEntity::find().order_by(company_model::Column::Name, Order::Asc);
        let total = query.clone().count(&self.db).await?;
        let items = query.offset(skip).limit(limit).all(&self.db).await?;
        Ok((items, total))
    }

    pub async fn count(&self) -> Result<u64, DbErr> {
        CompanyEntity::find().count(&self.db).await
    }

    /// 有効なサブスクリプションを持たない場合に限り削除する。
    /// 判定と削除は1文で行う
    pub async fn delete_if_no_active_subscriptions(&self, name: &str) -> Result<u64, DbErr> {
        let active_subscriptions = Query::select()
            .expr(Expr::val(1))
            .from(subscription_model::Entity)
            .and_where(subscription_model::Column::CompanyName.eq(name))
            .and_where(subscription_model::Column::Status.eq(SubscriptionStatus::Active.as_str()))
            .to_owned();

        let result = CompanyEntity::delete_many()
            .filter(company_model::Column::Name.eq(name))
            .filter(Expr::exists(active_subscriptions).not())
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }
}

/// 会社作成用構造体
#[derive(Debug, Clone)]
pub struct CreateCompany {
    pub name: String,
    pub street: String,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: Option<String>,
}
