// src/api/dto/report_dto.rs

use crate::types::query::deserialize_opt_u64_from_string;
use crate::types::PaginationQuery;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// 明細書の対象期間
#[derive(Debug, Default, Deserialize)]
pub struct StatementQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionListQuery {
    pub company_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_string")]
    pub limit: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_string")]
    pub skip: Option<u64>,
}

impl TransactionListQuery {
    pub fn pagination(&self) -> PaginationQuery {
        PaginationQuery::new(self.limit, self.skip)
    }
}
