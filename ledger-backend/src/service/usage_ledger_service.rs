// src/service/usage_ledger_service.rs
//
// サブスクリプションの利用単位（割当・消費・集計）を管理する

use crate::db::DbPool;
use crate::domain::subscription_model::{self, SubscriptionStatus, UnitKind};
use crate::domain::translation_transaction_model::{self, TRANSACTION_STATUS_COMPLETED};
use crate::domain::usage_period_model::{self, select_current_period, ConsumptionPlan};
use crate::error::{AppError, AppResult};
use crate::repository::subscription_repository::{CreateSubscription, SubscriptionRepository};
use crate::repository::translation_transaction_repository::TranslationTransactionRepository;
use crate::repository::usage_period_repository::UsagePeriodRepository;
use crate::service::integrity_service::IntegrityService;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, IntoActiveModel, Set, TransactionTrait};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// 条件付き更新の再試行回数
const MAX_CONSUME_ATTEMPTS: u32 = 5;

/// price_per_unit NUMERIC(18,6) と discount NUMERIC(7,6) の小数桁
const DECIMAL_SCALE: u32 = 6;
/// NUMERIC(18,6) の整数部は12桁まで
const MAX_PRICE_PER_UNIT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// サブスクリプション作成の入力
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub company_name: String,
    pub unit_kind: UnitKind,
    pub units_per_cycle: i64,
    pub price_per_unit: Decimal,
    pub promotional_units: i64,
    pub discount: Decimal,
    pub price: i64,
    pub currency: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

/// 冪等キー付きの利用記録リクエスト
#[derive(Debug, Clone, Default)]
pub struct UsageRequest {
    pub subscription_id: Option<Uuid>,
    pub units: i64,
    pub prefer_promotional: bool,
    pub company_name: Option<String>,
    pub user_id: Option<Uuid>,
    pub payment_id: Option<Uuid>,
    pub source_language: Option<String>,
    pub target_language: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageOutcome {
    pub transaction: translation_transaction_model::Model,
    pub period: Option<usage_period_model::Model>,
    /// 同じキーで既に記録済みだった
    pub replayed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub subscription_id: Uuid,
    pub company_name: String,
    pub unit_kind: String,
    pub status: String,
    /// 期間ごとのプロモーション枠
    pub promotional_units: i64,
    pub total_allocated: i64,
    pub total_used: i64,
    pub total_remaining: i64,
    pub total_promotional_used: i64,
    pub period_count: usize,
    pub current_period: Option<usage_period_model::Model>,
}

#[derive(Clone)]
pub struct UsageLedgerService {
    db: DbPool,
    integrity: Arc<IntegrityService>,
    subscription_repo: Arc<SubscriptionRepository>,
    period_repo: Arc<UsagePeriodRepository>,
}

impl UsageLedgerService {
    pub fn new(db: DbPool, integrity: Arc<IntegrityService>) -> Self {
        let subscription_repo = Arc::new(SubscriptionRepository::new(db.clone()));
        let period_repo = Arc::new(UsagePeriodRepository::new(db.clone()));
        Self {
            db,
            integrity,
            subscription_repo,
            period_repo,
        }
    }

    pub async fn create_subscription(
        &self,
        input: NewSubscription,
    ) -> AppResult<subscription_model::Model> {
        validate_new_subscription(&input)?;

        let company_name = input.company_name.trim().to_string();
        if !self.integrity.verify(&company_name).await? {
            tracing::warn!(company_name = %company_name, "Subscription rejected: company not found");
            return Err(AppError::ReferenceNotFound(format!(
                "Company '{}' does not exist",
                company_name
            )));
        }

        let subscription = self
            .subscription_repo
            .create(CreateSubscription {
                company_name,
                unit_kind: input.unit_kind.as_str().to_string(),
                units_per_cycle: input.units_per_cycle,
                price_per_unit: input.price_per_unit,
                promotional_units: input.promotional_units,
                discount: input.discount,
                price: input.price,
                currency: input.currency.trim().to_uppercase(),
                start_date: input.start_date,
                end_date: input.end_date,
            })
            .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            company_name = %subscription.company_name,
            unit_kind = %subscription.unit_kind,
            units_per_cycle = subscription.units_per_cycle,
            "Subscription created"
        );
        Ok(subscription)
    }

    pub async fn get_subscription(&self, id: Uuid) -> AppResult<subscription_model::Model> {
        self.subscription_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Subscription {} not found", id)))
    }

    /// 新しい利用期間を末尾に追加する。既存の期間には触れない
    pub async fn add_usage_period(
        &self,
        subscription_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        units_allocated: i64,
    ) -> AppResult<usage_period_model::Model> {
        if units_allocated < 0 {
            return Err(AppError::invalid_argument(
                "units_allocated",
                "must not be negative",
            ));
        }
        if period_end <= period_start {
            return Err(AppError::invalid_argument(
                "period_end",
                "must be after period_start",
            ));
        }

        self.get_subscription(subscription_id).await?;

        for _ in 0..MAX_CONSUME_ATTEMPTS {
            if let Some(period) = self
                .period_repo
                .append(subscription_id, period_start, period_end, units_allocated)
                .await?
            {
                tracing::info!(
                    subscription_id = %subscription_id,
                    sequence = period.sequence,
                    units_allocated,
                    "Usage period added"
                );
                return Ok(period);
            }
        }

        Err(AppError::Conflict(format!(
            "Could not allocate a period sequence for subscription {}",
            subscription_id
        )))
    }

    /// 現在の期間から units を消費する。不足時は一切変更しない
    pub async fn record_usage(
        &self,
        subscription_id: Uuid,
        units: i64,
        prefer_promotional: bool,
    ) -> AppResult<usage_period_model::Model> {
        if units <= 0 {
            return Err(AppError::invalid_argument("units", "must be greater than 0"));
        }
        let subscription = self.get_subscription(subscription_id).await?;
        ensure_active(&subscription)?;

        let (period, plan) =
            consume(&self.db, &subscription, units, prefer_promotional).await?;

        tracing::info!(
            subscription_id = %subscription_id,
            units,
            regular = plan.regular,
            promotional = plan.promotional,
            units_remaining = period.units_remaining,
            "Usage recorded"
        );
        Ok(period)
    }

    /// 冪等キー付きの利用記録。キーの確保と消費を同じトランザクションで行う。
    /// 同じキーの再実行は最初の記録を返し、二重に減算しない
    pub async fn record_usage_once(
        &self,
        idempotency_key: &str,
        request: UsageRequest,
    ) -> AppResult<UsageOutcome> {
        if request.units <= 0 {
            return Err(AppError::invalid_argument("units", "must be greater than 0"));
        }
        let subscription_id = request.subscription_id.ok_or_else(|| {
            AppError::invalid_argument("subscription_id", "is required for metered usage")
        })?;

        if let Some(outcome) = self.find_replay(idempotency_key).await? {
            return Ok(outcome);
        }

        let subscription = self.get_subscription(subscription_id).await?;
        ensure_active(&subscription)?;

        let txn = self.db.begin().await?;

        let claim = new_transaction(idempotency_key, &request, Some(&subscription));
        if !TranslationTransactionRepository::insert_if_absent_in(&txn, claim.clone()).await? {
            // 並行して同じキーが確保された
            txn.rollback().await?;
            return self.replay_or_conflict(idempotency_key).await;
        }

        let (period, plan) = consume(&txn, &subscription, request.units, request.prefer_promotional).await?;

        let mut active = claim.into_active_model();
        active.usage_period_id = Set(Some(period.id));
        active.promotional_units = Set(plan.promotional);
        let transaction = active.update(&txn).await?;

        txn.commit().await?;

        tracing::info!(
            idempotency_key,
            subscription_id = %subscription_id,
            units = request.units,
            promotional = plan.promotional,
            units_remaining = period.units_remaining,
            "Usage recorded"
        );

        Ok(UsageOutcome {
            transaction,
            period: Some(period),
            replayed: false,
        })
    }

    /// サブスクリプションを伴わない個別購入の記録（単位は消費しない）
    pub async fn record_individual_once(
        &self,
        idempotency_key: &str,
        request: UsageRequest,
    ) -> AppResult<UsageOutcome> {
        if request.units <= 0 {
            return Err(AppError::invalid_argument("units", "must be greater than 0"));
        }

        let transaction = new_transaction(idempotency_key, &request, None);
        if !TranslationTransactionRepository::insert_if_absent_in(&self.db, transaction.clone())
            .await?
        {
            return self.replay_or_conflict(idempotency_key).await;
        }

        tracing::info!(idempotency_key, units = request.units, "Individual purchase recorded");
        let transaction = TranslationTransactionRepository::find_by_key_in(&self.db, idempotency_key)
            .await?
            .unwrap_or(transaction);

        Ok(UsageOutcome {
            transaction,
            period: None,
            replayed: false,
        })
    }

    async fn find_replay(&self, idempotency_key: &str) -> AppResult<Option<UsageOutcome>> {
        let Some(transaction) =
            TranslationTransactionRepository::find_by_key_in(&self.db, idempotency_key).await?
        else {
            return Ok(None);
        };

        let period = match transaction.usage_period_id {
            Some(period_id) => self.period_repo.find_by_id(period_id).await?,
            None => None,
        };

        tracing::debug!(idempotency_key, "Usage already recorded for key");
        Ok(Some(UsageOutcome {
            transaction,
            period,
            replayed: true,
        }))
    }

    async fn replay_or_conflict(&self, idempotency_key: &str) -> AppResult<UsageOutcome> {
        self.find_replay(idempotency_key).await?.ok_or_else(|| {
            AppError::Conflict(format!(
                "Usage key '{}' is being recorded concurrently",
                idempotency_key
            ))
        })
    }

    /// 全期間の集計（読み取りのみ）
    pub async fn get_summary(&self, subscription_id: Uuid) -> AppResult<UsageSummary> {
        let subscription = self.get_subscription(subscription_id).await?;
        let periods = self.period_repo.find_by_subscription(subscription_id).await?;
        Ok(summarize(&subscription, &periods, Utc::now()))
    }

    /// end_date が as_of より前の active を expired にする。再実行しても件数以外は変わらない
    pub async fn expire_subscriptions(&self, as_of: DateTime<Utc>) -> AppResult<u64> {
        let expired = self.subscription_repo.expire_ended(as_of).await?;
        if expired > 0 {
            tracing::info!(expired, as_of = %as_of, "Subscriptions expired");
        }
        Ok(expired)
    }

    /// 管理操作によるステータス変更（active ↔ inactive、expired へは一方向）
    pub async fn set_subscription_status(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> AppResult<subscription_model::Model> {
        let subscription = self.get_subscription(subscription_id).await?;
        let current = subscription.status().ok_or_else(|| {
            AppError::InternalServerError(format!(
                "Subscription {} has unknown status '{}'",
                subscription_id, subscription.status
            ))
        })?;

        if current == status {
            return Ok(subscription);
        }
        if !current.can_transition_to(status) {
            return Err(AppError::InvalidTransition {
                from: current.to_string(),
                to: status.to_string(),
            });
        }

        if !self
            .subscription_repo
            .transition_status(subscription_id, current, status)
            .await?
        {
            return Err(AppError::Conflict(format!(
                "Subscription {} was modified concurrently",
                subscription_id
            )));
        }

        tracing::info!(
            subscription_id = %subscription_id,
            from = %current,
            to = %status,
            "Subscription status changed"
        );
        self.get_subscription(subscription_id).await
    }
}

fn validate_new_subscription(input: &NewSubscription) -> AppResult<()> {
    if input.company_name.trim().is_empty() {
        return Err(AppError::invalid_argument("company_name", "must not be empty"));
    }
    if input.units_per_cycle <= 0 {
        return Err(AppError::invalid_argument(
            "units_per_cycle",
            "must be greater than 0",
        ));
    }
    if input.price_per_unit <= Decimal::ZERO {
        return Err(AppError::invalid_argument(
            "price_per_unit",
            "must be greater than 0",
        ));
    }
    if input.price_per_unit >= MAX_PRICE_PER_UNIT {
        return Err(AppError::invalid_argument(
            "price_per_unit",
            "must be less than 1000000000000",
        ));
    }
    if input.discount <= Decimal::ZERO || input.discount > Decimal::ONE {
        return Err(AppError::invalid_argument("discount", "must be in (0, 1]"));
    }
    // 保存時に丸められないこと
    if input.price_per_unit.normalize().scale() > DECIMAL_SCALE {
        return Err(AppError::invalid_argument(
            "price_per_unit",
            format!("must have at most {} decimal places", DECIMAL_SCALE),
        ));
    }
    if input.discount.normalize().scale() > DECIMAL_SCALE {
        return Err(AppError::invalid_argument(
            "discount",
            format!("must have at most {} decimal places", DECIMAL_SCALE),
        ));
    }
    if input.promotional_units < 0 {
        return Err(AppError::invalid_argument(
            "promotional_units",
            "must not be negative",
        ));
    }
    if input.price < 0 {
        return Err(AppError::invalid_argument("price", "must not be negative"));
    }
    let currency = input.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::invalid_argument(
            "currency",
            "must be a 3-letter currency code",
        ));
    }
    if let Some(end_date) = input.end_date {
        if end_date < input.start_date {
            return Err(AppError::invalid_argument(
                "end_date",
                "must not precede start_date",
            ));
        }
    }
    Ok(())
}

fn ensure_active(subscription: &subscription_model::Model) -> AppResult<()> {
    if subscription.is_active() {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "Subscription {} is {}",
            subscription.id, subscription.status
        )))
    }
}

/// 現在の期間を読み、条件付き更新で消費する。競合した場合は読み直して再試行する
async fn consume<C: ConnectionTrait>(
    conn: &C,
    subscription: &subscription_model::Model,
    units: i64,
    prefer_promotional: bool,
) -> AppResult<(usage_period_model::Model, ConsumptionPlan)> {
    for attempt in 1..=MAX_CONSUME_ATTEMPTS {
        let periods = UsagePeriodRepository::find_by_subscription_in(conn, subscription.id).await?;
        let current = select_current_period(&periods, Utc::now()).ok_or(
            AppError::InsufficientUnits {
                requested: units,
                available: 0,
            },
        )?;

        let plan =
            current.plan_consumption(units, subscription.promotional_units, prefer_promotional)?;

        if UsagePeriodRepository::consume_in(conn, current, plan).await? {
            let period = UsagePeriodRepository::find_by_id_in(conn, current.id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Usage period {}", current.id)))?;
            return Ok((period, plan));
        }

        tracing::debug!(
            subscription_id = %subscription.id,
            attempt,
            "Usage period changed concurrently, retrying"
        );
    }

    Err(AppError::Conflict(format!(
        "Usage for subscription {} is contended, retry later",
        subscription.id
    )))
}

fn new_transaction(
    idempotency_key: &str,
    request: &UsageRequest,
    subscription: Option<&subscription_model::Model>,
) -> translation_transaction_model::Model {
    translation_transaction_model::Model {
        id: Uuid::new_v4(),
        idempotency_key: idempotency_key.to_string(),
        company_name: request
            .company_name
            .clone()
            .or_else(|| subscription.map(|s| s.company_name.clone())),
        user_id: request.user_id,
        subscription_id: subscription.map(|s| s.id),
        usage_period_id: None,
        payment_id: request.payment_id,
        units: request.units,
        promotional_units: 0,
        source_language: request.source_language.clone(),
        target_language: request.target_language.clone(),
        status: TRANSACTION_STATUS_COMPLETED.to_string(),
        created_at: Utc::now(),
    }
}

pub fn summarize(
    subscription: &subscription_model::Model,
    periods: &[usage_period_model::Model],
    now: DateTime<Utc>,
) -> UsageSummary {
    UsageSummary {
        subscription_id: subscription.id,
        company_name: subscription.company_name.clone(),
        unit_kind: subscription.unit_kind.clone(),
        status: subscription.status.clone(),
        promotional_units: subscription.promotional_units,
        total_allocated: periods.iter().map(|p| p.units_allocated).sum(),
        total_used: periods.iter().map(|p| p.units_used).sum(),
        total_remaining: periods.iter().map(|p| p.units_remaining).sum(),
        total_promotional_used: periods.iter().map(|p| p.promotional_units_used).sum(),
        period_count: periods.len(),
        current_period: select_current_period(periods, now).cloned(),
    }
}
