// src/api/dto/payment_dto.rs

use crate::domain::payment_model::PaymentStatus;
use crate::error::AppError;
use crate::repository::payment_repository::PaymentFilter;
use crate::types::query::deserialize_opt_u64_from_string;
use crate::types::{PaginationQuery, SortOrder};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// 支払い一覧のクエリ
#[derive(Debug, Default, Deserialize)]
pub struct PaymentListQuery {
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

impl PaymentListQuery {
    pub fn into_parts(self) -> Result<(PaymentFilter, PaginationQuery, SortOrder), AppError> {
        let status = super::parse_enum::<PaymentStatus>("status", self.status.as_deref())?;
        let filter = PaymentFilter {
            company_name: self.company_name.filter(|c| !c.trim().is_empty()),
            status,
            from: self.from,
            to: self.to,
        };
        Ok((filter, PaginationQuery::new(self.limit, self.skip), self.sort))
    }
}

/// 再連携スイープのクエリ
#[derive(Debug, Default, Deserialize)]
pub struct RelinkQuery {
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_string")]
    pub limit: Option<u64>,
}

impl RelinkQuery {
    pub const DEFAULT_LIMIT: u64 = 100;
    pub const MAX_LIMIT: u64 = 1000;

    pub fn limit(&self) -> u64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}
