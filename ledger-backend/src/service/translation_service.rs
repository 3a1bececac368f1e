// src/service/translation_service.rs
//
// 翻訳パイプラインの作業完了通知を利用記録に変換する

use crate::db::DbPool;
use crate::domain::translation_transaction_model::{self, work_item_key};
use crate::error::{AppError, AppResult};
use crate::repository::translation_transaction_repository::TranslationTransactionRepository;
use crate::service::usage_ledger_service::{UsageLedgerService, UsageOutcome, UsageRequest};
use crate::types::{PaginatedResponse, PaginationQuery};
use std::sync::Arc;
use uuid::Uuid;

/// 作業単位の完了通知
#[derive(Debug, Clone)]
pub struct WorkItemCompletion {
    pub work_item_id: String,
    pub subscription_id: Option<Uuid>,
    pub company_name: Option<String>,
    pub user_id: Option<Uuid>,
    pub units: i64,
    pub prefer_promotional: bool,
    pub source_language: Option<String>,
    pub target_language: Option<String>,
}

#[derive(Clone)]
pub struct TranslationService {
    ledger: Arc<UsageLedgerService>,
    transaction_repo: Arc<TranslationTransactionRepository>,
}

impl TranslationService {
    pub fn new(db: DbPool, ledger: Arc<UsageLedgerService>) -> Self {
        Self {
            ledger,
            transaction_repo: Arc::new(TranslationTransactionRepository::new(db)),
        }
    }

    /// 作業単位ごとに1回だけ単位を消費する。完了通知の再送は最初の記録を返す
    pub async fn complete_work_item(&self, completion: WorkItemCompletion) -> AppResult<UsageOutcome> {
        let work_item_id = completion.work_item_id.trim();
        if work_item_id.is_empty() {
            return Err(AppError::invalid_argument("work_item_id", "must not be empty"));
        }

        let key = work_item_key(work_item_id);
        let request = UsageRequest {
            subscription_id: completion.subscription_id,
            units: completion.units,
            prefer_promotional: completion.prefer_promotional,
            company_name: completion.company_name,
            user_id: completion.user_id,
            payment_id: None,
            source_language: completion.source_language,
            target_language: completion.target_language,
        };

        let outcome = match completion.subscription_id {
            Some(_) => self.ledger.record_usage_once(&key, request).await?,
            None => self.ledger.record_individual_once(&key, request).await?,
        };

        if outcome.replayed {
            tracing::info!(work_item_id, "Work item completion replayed");
        }
        Ok(outcome)
    }

    pub async fn list_transactions(
        &self,
        company_name: Option<&str>,
        pagination: &PaginationQuery,
    ) -> AppResult<PaginatedResponse<translation_transaction_model::Model>> {
        let (limit, skip) = pagination.resolve();
        let (items, total) = self
            .transaction_repo
            .list(company_name, limit, skip)
            .await?;
        Ok(PaginatedResponse::new(items, total, limit, skip))
    }
}
