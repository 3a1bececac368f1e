// src/service/company_service.rs

use crate::db::DbPool;
use crate::domain::company_model;
use crate::error::{AppError, AppResult};
use crate::repository::company_repository::{CompanyRepository, CreateCompany};
use crate::types::{PaginatedResponse, PaginationQuery};
use std::sync::Arc;

#[derive(Clone)]
pub struct CompanyService {
    company_repo: Arc<CompanyRepository>,
}

impl CompanyService {
    pub fn new(db: DbPool) -> Self {
        Self {
            company_repo: Arc::new(CompanyRepository::new(db)),
        }
    }

    /// 会社を作成する。重複はユニークインデックスで検出する
    pub async fn create_company(&self, mut input: CreateCompany) -> AppResult<company_model::Model> {
        input.name = input.name.trim().to_string();
        if input.name.is_empty() {
            return Err(AppError::invalid_argument("name", "must not be empty"));
        }

        let name = input.name.clone();
        let company = self
            .company_repo
            .create(input)
            .await?
            .ok_or_else(|| AppError::Conflict(format!("Company '{}' already exists", name)))?;

        tracing::info!(company_name = %company.name, company_id = %company.id, "Company created");
        Ok(company)
    }

    pub async fn get_company(&self, name: &str) -> AppResult<company_model::Model> {
        self.company_repo
            .find_by_name(name.trim())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Company '{}' not found", name)))
    }

    pub async fn list_companies(
        &self,
        pagination: &PaginationQuery,
    ) -> AppResult<PaginatedResponse<company_model::Model>> {
        let (limit, skip) = pagination.resolve();
        let (items, total) = self.company_repo.list(limit, skip).await?;
        Ok(PaginatedResponse::new(items, total, limit, skip))
    }

    /// 有効なサブスクリプションがある間は削除しない（連鎖削除もしない）
    pub async fn delete_company(&self, name: &str) -> AppResult<()> {
        let name = name.trim();
        let deleted = self
            .company_repo
            .delete_if_no_active_subscriptions(name)
            .await?;

        if deleted > 0 {
            tracing::info!(company_name = %name, "Company deleted");
            return Ok(());
        }

        if self.company_repo.exists_by_name(name).await? {
            Err(AppError::Conflict(format!(
                "Company '{}' still has active subscriptions",
                name
            )))
        } else {
            Err(AppError::NotFound(format!("Company '{}' not found", name)))
        }
    }
}
