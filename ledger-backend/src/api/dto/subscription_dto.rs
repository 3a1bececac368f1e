// src/api/dto/subscription_dto.rs

use crate::domain::subscription_model::{SubscriptionStatus, UnitKind};
use crate::domain::translation_transaction_model;
use crate::domain::usage_period_model;
use crate::error::AppError;
use crate::repository::subscription_repository::SubscriptionFilter;
use crate::service::usage_ledger_service::NewSubscription;
use crate::types::query::deserialize_opt_u64_from_string;
use crate::types::{PaginationQuery, SortOrder};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

fn default_discount() -> Decimal {
    Decimal::ONE
}

fn default_true() -> bool {
    true
}

/// サブスクリプション作成リクエスト。
/// 単価と割引率は2進浮動小数点を経由しないよう文字列で受け取る
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    #[validate(length(min = 1, max = 200, message = "Company name is required"))]
    pub company_name: String,

    pub unit_kind: UnitKind,

    #[validate(range(min = 1, message = "units_per_cycle must be greater than 0"))]
    pub units_per_cycle: i64,

    #[serde(with = "rust_decimal::serde::str")]
    pub price_per_unit: Decimal,

    #[serde(default)]
    #[validate(range(min = 0, message = "promotional_units must not be negative"))]
    pub promotional_units: i64,

    #[serde(default = "default_discount", with = "rust_decimal::serde::str")]
    pub discount: Decimal,

    #[validate(range(min = 0, message = "price must not be negative"))]
    pub price: i64,

    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    pub currency: String,

    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl CreateSubscriptionRequest {
    pub fn into_new_subscription(self, now: DateTime<Utc>) -> NewSubscription {
        NewSubscription {
            company_name: self.company_name,
            unit_kind: self.unit_kind,
            units_per_cycle: self.units_per_cycle,
            price_per_unit: self.price_per_unit,
            promotional_units: self.promotional_units,
            discount: self.discount,
            price: self.price,
            currency: self.currency,
            start_date: self.start_date.unwrap_or(now),
            end_date: self.end_date,
        }
    }
}

/// 利用期間追加リクエスト
#[derive(Debug, Deserialize, Validate)]
pub struct AddUsagePeriodRequest {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    #[validate(range(min = 0, message = "units_allocated must not be negative"))]
    pub units_allocated: i64,
}

/// 利用記録リクエスト。idempotency_key を付けると同じキーでの再送は1回分として扱う
#[derive(Debug, Deserialize, Validate)]
pub struct RecordUsageRequest {
    #[validate(range(min = 1, message = "units must be greater than 0"))]
    pub units: i64,
    #[serde(default = "default_true")]
    pub prefer_promotional: bool,
    #[validate(length(min = 1, max = 200))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordUsageResponse {
    pub period: Option<usage_period_model::Model>,
    pub transaction: Option<translation_transaction_model::Model>,
    pub replayed: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionStatusRequest {
    pub status: SubscriptionStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExpireSubscriptionsRequest {
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ExpireSubscriptionsResponse {
    pub as_of: DateTime<Utc>,
    pub expired: u64,
}

/// サブスクリプション一覧のクエリ
#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionListQuery {
    pub company_name: Option<String>,
    pub status: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sort: SortOrder,
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_string")]
    pub limit: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_string")]
    pub skip: Option<u64>,
}

impl SubscriptionListQuery {
    pub fn into_parts(self) -> Result<(SubscriptionFilter, PaginationQuery, SortOrder), AppError> {
        let status = super::parse_enum::<SubscriptionStatus>("status", self.status.as_deref())?;
        let filter = SubscriptionFilter {
            company_name: self.company_name.filter(|c| !c.trim().is_empty()),
            status,
            from: self.from,
            to: self.to,
        };
        Ok((filter, PaginationQuery::new(self.limit, self.skip), self.sort))
    }
}
