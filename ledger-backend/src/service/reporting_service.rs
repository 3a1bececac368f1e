// src/service/reporting_service.rs
//
// 台帳と支払いを読み取るだけの集計

use crate::db::DbPool;
use crate::domain::company_model;
use crate::domain::payment_model;
use crate::domain::payment_refund_model;
use crate::domain::subscription_model;
use crate::error::{AppError, AppResult};
use crate::repository::company_repository::CompanyRepository;
use crate::repository::payment_refund_repository::PaymentRefundRepository;
use crate::repository::payment_repository::{CurrencyTotals, PaymentFilter, PaymentRepository};
use crate::repository::subscription_repository::{SubscriptionFilter, SubscriptionRepository};
use crate::repository::usage_period_repository::{UsagePeriodRepository, UsageTotals};
use crate::service::usage_ledger_service::{summarize, UsageSummary};
use crate::types::{PaginatedResponse, PaginationQuery, SortOrder};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CurrencyRevenue {
    pub currency: String,
    pub payments: i64,
    pub gross: i64,
    pub refunded: i64,
    pub net: i64,
}

impl From<CurrencyTotals> for CurrencyRevenue {
    fn from(totals: CurrencyTotals) -> Self {
        Self {
            net: totals.gross - totals.refunded,
            currency: totals.currency,
            payments: totals.payments,
            gross: totals.gross,
            refunded: totals.refunded,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitMetrics {
    pub allocated: i64,
    pub used: i64,
    pub remaining: i64,
    pub promotional_used: i64,
}

impl From<UsageTotals> for UnitMetrics {
    fn from(totals: UsageTotals) -> Self {
        Self {
            allocated: totals.total_allocated,
            used: totals.total_used,
            remaining: totals.total_remaining,
            promotional_used: totals.total_promotional_used,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardMetrics {
    pub companies: u64,
    pub subscriptions_by_status: BTreeMap<String, i64>,
    pub payments: u64,
    pub revenue: Vec<CurrencyRevenue>,
    pub units: UnitMetrics,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentWithRefunds {
    #[serde(flatten)]
    pub payment: payment_model::Model,
    pub refunds: Vec<payment_refund_model::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanyStatement {
    pub company: company_model::Model,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub subscriptions: Vec<UsageSummary>,
    pub payments: Vec<PaymentWithRefunds>,
    pub totals: Vec<CurrencyRevenue>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ReportingService {
    company_repo: Arc<CompanyRepository>,
    subscription_repo: Arc<SubscriptionRepository>,
    period_repo: Arc<UsagePeriodRepository>,
    payment_repo: Arc<PaymentRepository>,
    refund_repo: Arc<PaymentRefundRepository>,
}

impl ReportingService {
    pub fn new(db: DbPool) -> Self {
        Self {
            company_repo: Arc::new(CompanyRepository::new(db.clone())),
            subscription_repo: Arc::new(SubscriptionRepository::new(db.clone())),
            period_repo: Arc::new(UsagePeriodRepository::new(db.clone())),
            payment_repo: Arc::new(PaymentRepository::new(db.clone())),
            refund_repo: Arc::new(PaymentRefundRepository::new(db)),
        }
    }

    pub async fn list_payments(
        &self,
        filter: &PaymentFilter,
        pagination: &PaginationQuery,
        sort: SortOrder,
    ) -> AppResult<PaginatedResponse<payment_model::Model>> {
        validate_range(filter.from, filter.to)?;
        let (limit, skip) = pagination.resolve();
        let (items, total) = self.payment_repo.list(filter, limit, skip, sort).await?;
        Ok(PaginatedResponse::new(items, total, limit, skip))
    }

    pub async fn list_subscriptions(
        &self,
        filter: &SubscriptionFilter,
        pagination: &PaginationQuery,
        sort: SortOrder,
    ) -> AppResult<PaginatedResponse<subscription_model::Model>> {
        validate_range(filter.from, filter.to)?;
        let (limit, skip) = pagination.resolve();
        let (items, total) = self
            .subscription_repo
            .list(filter, limit, skip, sort)
            .await?;
        Ok(PaginatedResponse::new(items, total, limit, skip))
    }

    pub async fn dashboard_metrics(&self) -> AppResult<DashboardMetrics> {
        let companies = self.company_repo.count().await?;
        let subscriptions_by_status = self
            .subscription_repo
            .count_by_status()
            .await?
            .into_iter()
            .map(|row| (row.status, row.count))
            .collect();
        let payments = self.payment_repo.count().await?;
        let revenue = self
            .payment_repo
            .totals_by_currency(None, None, None)
            .await?
            .into_iter()
            .map(CurrencyRevenue::from)
            .collect();
        let units = self.period_repo.totals().await?.into();

        Ok(DashboardMetrics {
            companies,
            subscriptions_by_status,
            payments,
            revenue,
            units,
            generated_at: Utc::now(),
        })
    }

    /// 会社の明細書。サブスクリプションの利用集計と期間内の支払い・返金
    pub async fn company_statement(
        &self,
        company_name: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<CompanyStatement> {
        validate_range(from, to)?;
        let company = self
            .company_repo
            .find_by_name(company_name.trim())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Company '{}' not found", company_name)))?;

        let now = Utc::now();
        let mut subscriptions = Vec::new();
        for subscription in self.subscription_repo.find_by_company(&company.name).await? {
            let periods = self.period_repo.find_by_subscription(subscription.id).await?;
            subscriptions.push(summarize(&subscription, &periods, now));
        }

        let mut payments = Vec::new();
        for payment in self
            .payment_repo
            .find_by_company_in_range(&company.name, from, to)
            .await?
        {
            let refunds = self.refund_repo.find_by_payment(payment.id).await?;
            payments.push(PaymentWithRefunds { payment, refunds });
        }

        let totals = self
            .payment_repo
            .totals_by_currency(Some(&company.name), from, to)
            .await?
            .into_iter()
            .map(CurrencyRevenue::from)
            .collect();

        Ok(CompanyStatement {
            company,
            from,
            to,
            subscriptions,
            payments,
            totals,
            generated_at: now,
        })
    }
}

fn validate_range(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> AppResult<()> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => {
            Err(AppError::invalid_argument("from", "must not be after `to`"))
        }
        _ => Ok(()),
    }
}
